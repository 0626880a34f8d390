//! Notification sink — the fire-and-forget delivery port.
//!
//! The engine calls the sink after every state transition (registration
//! confirmed, cancelled, waitlist slot offered, transfer received/resolved).
//! Delivery is best-effort by contract: a failing sink must never roll back
//! the state transition that triggered it. The effect executor enforces
//! this by logging failures and moving on.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error returned by a notification sink.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// The downstream channel (email, push, webhook) failed.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// The recipient is unknown to the sink.
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),
}

/// A single notification to deliver.
///
/// `kind` is a stable dotted identifier (`"registration.confirmed"`,
/// `"waitlist.slot_offered"`, …) the sink maps to a template; `body`
/// carries the template parameters as JSON.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Who the notification is for (opaque recipient identifier).
    pub recipient: String,
    /// Stable notification kind identifier.
    pub kind: String,
    /// Template parameters.
    pub body: Value,
}

impl Notice {
    /// Create a notice.
    #[must_use]
    pub fn new(recipient: impl Into<String>, kind: impl Into<String>, body: Value) -> Self {
        Self {
            recipient: recipient.into(),
            kind: kind.into(),
            body,
        }
    }
}

/// Notification delivery port.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` instead of `async fn` so the trait can be
/// captured as `Arc<dyn NotificationSink>` inside effects.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notice.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails; callers treat the
    /// failure as non-fatal.
    fn deliver(
        &self,
        notice: Notice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
