//! Identity/profile source — read-only snapshot provider.
//!
//! The engine captures a user's name, document, phone, email, and
//! reputation score exactly once: at registration time (and again for the
//! recipient at transfer acceptance). Later profile edits never touch an
//! existing registration.

use crate::types::{AttendeeSnapshot, ReputationScore, UserId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A point-in-time view of a user's profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Identity fields copied onto the registration.
    pub attendee: AttendeeSnapshot,
    /// Reputation score feeding the pricing policy.
    pub reputation: ReputationScore,
}

/// Errors from the profile directory.
#[derive(Error, Debug, Clone)]
pub enum ProfileError {
    /// No profile for this user.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// The directory could not be reached.
    #[error("profile directory unavailable: {0}")]
    Unavailable(String),
}

/// Profile directory port.
pub trait ProfileDirectory: Send + Sync {
    /// Fetch the current snapshot of a user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::UnknownUser`] for unknown users and
    /// [`ProfileError::Unavailable`] for transport failures.
    fn fetch(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<ProfileSnapshot, ProfileError>> + Send + '_>>;
}
