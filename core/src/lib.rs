//! # Turnstile Core
//!
//! Core traits and types for the Turnstile registration engine.
//!
//! Turnstile models each ticketed event as an independent, event-sourced
//! aggregate driven by the Reducer pattern:
//!
//! - **State**: the registration domain of one event (ledger, registrations,
//!   waitlist, transfers)
//! - **Action**: all possible inputs to a reducer (commands and events)
//! - **Reducer**: pure function `(State, Action, Environment) → Effects`
//! - **Effect**: side-effect *descriptions* (persistence, notification,
//!   delayed actions) executed by the runtime, never by the reducer itself
//! - **Environment**: injected dependencies behind traits (clock, event
//!   store, notification sink)
//!
//! The runtime crate (`turnstile-runtime`) provides the `Store` that owns a
//! reducer's state and serializes all access to it. One store per event is
//! what makes "check capacity, then take the slot" atomic for that event
//! while leaving unrelated events fully parallel.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod effect;
pub mod effect_macros;
pub mod environment;
pub mod event;
pub mod event_store;
pub mod notify;
pub mod reducer;
pub mod stream;
