//! # Turnstile Engine
//!
//! Registration and capacity lifecycle engine for event ticketing.
//!
//! Organizers publish events with finite capacity; attendees register, pay
//! a deposit, get waitlisted when full, may transfer their slot, and check
//! in at the door. This crate is the component that decides, for a single
//! event, who holds one of a fixed number of slots, in what state, and how
//! slots move between pending-payment, confirmed, cancelled, transferred,
//! and waitlisted attendees — without ever double-allocating a slot.
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────────────────────────────────┐
//!                 │          RegistrationEngine            │
//!                 │   one Store per event (no shared lock) │
//!                 └──────┬──────────────┬──────────────────┘
//!                        │              │
//!              ┌─────────▼────┐  ┌──────▼───────┐
//!              │ Store event A│  │ Store event B│   ... fully parallel
//!              └─────────┬────┘  └──────────────┘
//!                        │  write lock = per-event serialization
//!          ┌─────────────▼──────────────┐
//!          │       RegistryReducer      │
//!          │  registration ─ waitlist ─ │
//!          │         transfer           │
//!          │   (one CapacityLedger)     │
//!          └─────────────┬──────────────┘
//!                        │ effects
//!         persist ─ notify ─ delay ─ authorize
//! ```
//!
//! # Key guarantees
//!
//! - `confirmed_count(event) <= capacity(event)`, always: every grant goes
//!   through the ledger's `try_reserve` inside the event's critical
//!   section.
//! - At most one pending/confirmed/waitlisted registration per
//!   (user, event).
//! - Waitlist promotion is strict FIFO and runs inside the same critical
//!   section as the release that freed the slot.
//! - Expiry races with payment confirmation resolve first-writer-wins;
//!   the loser is an idempotent no-op.
//! - Notification failures are logged and swallowed; they never roll back
//!   a state transition.

pub mod aggregates;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod payment;
pub mod pricing;
pub mod profile;
pub mod sweeper;
pub mod types;

pub use aggregates::{
    RegistrationAction, RegistryAction, RegistryEnvironment, RegistryReducer, TransferAction,
    WaitlistAction,
};
pub use config::{EngineConfig, EnginePolicy};
pub use engine::{RegistrationEngine, RegistrationOutcome, WaitlistReceipt, WaitlistSnapshot};
pub use error::RegistrationError;
pub use events::RegistryEvent;
pub use ledger::CapacityLedger;
pub use pricing::{PricingPolicy, Quote, discount_percent};
pub use sweeper::ExpirySweeper;
pub use types::*;
