//! Error taxonomy of the registration engine.
//!
//! Invariant violations (capacity, uniqueness) are hard failures returned
//! synchronously; capacity exhaustion is deliberately *not* here — it is a
//! routing signal, and `register` answers it with a waitlist outcome.
//! Notification failures never surface at all: they are swallowed and
//! logged by the effect executor.

use crate::types::RegistrationStatus;
use thiserror::Error;

/// Everything a registration-engine operation can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The user already holds a pending, confirmed, or waitlisted
    /// registration for this event.
    #[error("user already holds an active registration for this event")]
    AlreadyRegistered,

    /// The user is already queued for this event.
    #[error("user is already queued on the waitlist for this event")]
    AlreadyQueued,

    /// The user holds no queued waitlist entry for this event.
    #[error("user is not queued on the waitlist for this event")]
    NotWaitlisted,

    /// The requested transition is not valid from the current status.
    /// When the end state is already the requested one, the engine treats
    /// the attempt as an idempotent no-op instead of raising this.
    #[error("registration is {from}; cannot {attempted}")]
    InvalidTransition {
        /// Status the registration was in.
        from: RegistrationStatus,
        /// What was attempted.
        attempted: String,
    },

    /// Event policy or lead-time forbids the transfer.
    #[error("transfer not allowed: {0}")]
    TransferNotAllowed(String),

    /// The registration's payment deadline passed and its slot was
    /// reclaimed; the user should register again.
    #[error("registration expired; please register again")]
    ExpiredRegistration,

    /// The event still has capacity; register directly instead of joining
    /// the waitlist.
    #[error("event has available capacity; register directly")]
    CapacityAvailable,

    /// The event is not open for registration.
    #[error("event is not open for registration")]
    RegistrationClosed,

    /// No such event is published on this engine.
    #[error("unknown event")]
    UnknownEvent,

    /// No such registration.
    #[error("unknown registration")]
    UnknownRegistration,

    /// No such transfer request.
    #[error("unknown transfer request")]
    UnknownTransfer,

    /// No such user in the profile directory.
    #[error("unknown user")]
    UnknownUser,

    /// The event is already published on this engine.
    #[error("event is already published")]
    AlreadyPublished,

    /// Events must offer at least one slot.
    #[error("event capacity must be positive")]
    ZeroCapacity,

    /// Opaque pass-through from the payment gateway; the caller may retry.
    #[error("payment gateway error: {0}")]
    PaymentGateway(String),

    /// Internal storage or runtime failure; generic and retryable.
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_actionable() {
        let err = RegistrationError::InvalidTransition {
            from: RegistrationStatus::Cancelled,
            attempted: "check in".to_string(),
        };
        assert_eq!(format!("{err}"), "registration is cancelled; cannot check in");

        assert_eq!(
            format!("{}", RegistrationError::ExpiredRegistration),
            "registration expired; please register again"
        );
    }
}
