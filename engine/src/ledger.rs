//! Capacity ledger — the single source of truth for slot accounting.
//!
//! An explicitly owned counter, not a `COUNT(*)` derived on every read:
//! every grant goes through [`CapacityLedger::try_reserve`] and every
//! release through [`CapacityLedger::release`]. The ledger itself is a
//! plain value; linearizability per event comes from the fact that it is
//! only ever mutated inside the event's store while the write lock is held.

use crate::types::Capacity;
use serde::{Deserialize, Serialize};

/// Per-event slot counter.
///
/// `confirmed` counts slot holders — pending registrations provisionally
/// hold their slot just like confirmed ones, which is what prevents two
/// pending payments from both believing they have the last slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLedger {
    capacity: Capacity,
    confirmed: u32,
}

impl CapacityLedger {
    /// Fresh ledger with no slots taken.
    #[must_use]
    pub const fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            confirmed: 0,
        }
    }

    /// Atomically (under the owning store's lock): if a slot is free, take
    /// it and return true; otherwise return false.
    pub fn try_reserve(&mut self) -> bool {
        if self.confirmed < self.capacity.value() {
            self.confirmed += 1;
            true
        } else {
            false
        }
    }

    /// Return a slot to the pool. Never goes below zero.
    pub fn release(&mut self) {
        self.confirmed = self.confirmed.saturating_sub(1);
    }

    /// Slots still available.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.capacity.value() - self.confirmed
    }

    /// Slots currently held.
    #[must_use]
    pub const fn confirmed_count(&self) -> u32 {
        self.confirmed
    }

    /// Total slots.
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Whether every slot is taken.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.confirmed >= self.capacity.value()
    }
}
