//! Event store trait — the persistence port.
//!
//! Durable storage for event streams is an external collaborator; the core
//! only requires the atomicity guarantees expressed here: append-only
//! streams with optimistic concurrency. The testing crate ships an
//! in-memory implementation; a production deployment plugs in whatever
//! storage satisfies the trait.

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match the
    /// stream's current version (another writer got there first).
    #[error("Concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Stream not found in the event store.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Event store abstraction for storing and retrieving event streams.
///
/// Deliberately minimal: append with optimistic concurrency, load for
/// replay. Projection management, subscriptions, and querying beyond
/// stream-id lookup are someone else's job.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
/// the trait can be used as `Arc<dyn EventStore>` inside effects.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// `expected_version` of `Some(v)` asserts the stream is currently at
    /// version `v`; `None` appends unconditionally (safe when the caller is
    /// the stream's single writer, as each per-event store is).
    ///
    /// Returns the new stream version after the append.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] on a version mismatch
    /// - [`EventStoreError::StorageError`] if the backend fails
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load events from a stream, oldest first.
    ///
    /// `from_version` of `Some(v)` loads events from that version onwards
    /// (inclusive); `None` loads the whole stream. A stream that does not
    /// exist yet returns an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::StorageError`] if the backend fails
    /// - [`EventStoreError::SerializationError`] if stored events do not decode
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>;
}
