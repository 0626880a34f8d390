//! # Turnstile Testing
//!
//! Testing utilities and mocks for the Turnstile registration engine:
//!
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`]) for driving
//!   payment deadlines and expiry sweeps under test
//! - An in-memory [`mocks::InMemoryEventStore`] with real optimistic
//!   concurrency semantics
//! - A [`mocks::RecordingNotificationSink`] that captures every notice and
//!   a failing variant for exercising the swallow-and-log contract
//! - [`ReducerTest`], a fluent Given/When/Then harness for reducers

pub mod mocks;

pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
