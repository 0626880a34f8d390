//! Mock implementations of the core environment traits.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use turnstile_core::environment::Clock;
use turnstile_core::event::SerializedEvent;
use turnstile_core::event_store::{EventStore, EventStoreError};
use turnstile_core::notify::{NotificationSink, Notice, NotifyError};
use turnstile_core::stream::{StreamId, Version};

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed clock for deterministic tests — always returns the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a fixed clock.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// A clock that stands still until the test advances it.
///
/// Expiry logic is driven entirely by the injected clock, so advancing this
/// clock past a payment deadline and then sweeping is how tests exercise
/// the timeout path without waiting wall-clock time.
#[derive(Debug)]
pub struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    /// Create a stepping clock starting at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a stepping clock starting at the default test time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(test_clock().now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = relock(&self.now);
        *now += by;
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *relock(&self.now) = to;
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        *relock(&self.now)
    }
}

/// In-memory event store with real optimistic-concurrency semantics.
///
/// Fast and deterministic; the production deployment swaps in durable
/// storage behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<StreamId, Vec<SerializedEvent>>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events currently stored for a stream.
    #[must_use]
    pub fn stream_len(&self, stream_id: &StreamId) -> usize {
        relock(&self.streams)
            .get(stream_id)
            .map_or(0, Vec::len)
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        let result = {
            let mut streams = relock(&self.streams);
            let stream = streams.entry(stream_id.clone()).or_default();
            let current = Version::new(stream.len() as u64);

            if let Some(expected) = expected_version {
                if expected != current {
                    Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current,
                    })
                } else {
                    stream.extend(events);
                    Ok(Version::new(stream.len() as u64))
                }
            } else {
                stream.extend(events);
                Ok(Version::new(stream.len() as u64))
            }
        };
        Box::pin(async move { result })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        let events = {
            let streams = relock(&self.streams);
            let stream = streams.get(&stream_id).cloned().unwrap_or_default();
            match from_version {
                // Version N means "N events appended"; from_version V skips
                // the first V - 1 entries so event number V is included.
                Some(from) => {
                    let skip = usize::try_from(from.value().saturating_sub(1)).unwrap_or(usize::MAX);
                    stream.into_iter().skip(skip).collect()
                },
                None => stream,
            }
        };
        Box::pin(async move { Ok(events) })
    }
}

/// Notification sink that records every delivered notice.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    delivered: Mutex<Vec<Notice>>,
}

impl RecordingNotificationSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notice> {
        relock(&self.delivered).clone()
    }

    /// Kinds of all notices delivered so far, in delivery order.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        relock(&self.delivered)
            .iter()
            .map(|n| n.kind.clone())
            .collect()
    }

    /// Notices delivered to a specific recipient.
    #[must_use]
    pub fn for_recipient(&self, recipient: &str) -> Vec<Notice> {
        relock(&self.delivered)
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn deliver(
        &self,
        notice: Notice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        relock(&self.delivered).push(notice);
        Box::pin(async { Ok(()) })
    }
}

/// Notification sink that always fails delivery.
///
/// Used to verify that sink failures never affect the transactional
/// outcome of a state transition.
#[derive(Debug, Default)]
pub struct FailingNotificationSink;

impl NotificationSink for FailingNotificationSink {
    fn deliver(
        &self,
        notice: Notice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move { Err(NotifyError::DeliveryFailed(format!("sink down: {}", notice.kind))) })
    }
}
