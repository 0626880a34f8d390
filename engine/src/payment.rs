//! Payment capability — the external card/PIX processor port.
//!
//! The engine opens a session when a priced registration is created and
//! consumes the result when the processor reports back (webhook or poll,
//! translated by the transport layer into
//! [`RegistrationEngine::payment_result`](crate::engine::RegistrationEngine::payment_result)).
//! Gateway protocol detail never enters the core; a gateway failure is an
//! opaque pass-through retried by the caller, not by the engine.

use crate::types::Registration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Opaque handle to a payment session opened at the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession(String);

impl PaymentSession {
    /// Wrap a gateway session handle.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw session handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome of a payment session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentResult {
    /// The capture succeeded.
    Approved,
    /// The capture was declined.
    Declined {
        /// Gateway-provided reason.
        reason: String,
    },
}

/// Errors reported by the payment gateway.
#[derive(Error, Debug, Clone)]
pub enum PaymentGatewayError {
    /// The gateway could not be reached.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused to open a session.
    #[error("authorization refused: {0}")]
    Refused(String),
}

/// Payment gateway port.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so the trait can be captured as
/// `Arc<dyn PaymentGateway>` inside effects.
pub trait PaymentGateway: Send + Sync {
    /// Open a payment session for a pending registration.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentGatewayError`] when the session cannot be opened;
    /// the registration stays pending and the caller may retry until the
    /// deadline.
    fn authorize(
        &self,
        registration: Registration,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentSession, PaymentGatewayError>> + Send + '_>>;
}
