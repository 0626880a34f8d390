//! Effect execution against real (in-memory) ports: persistence with
//! retry and dead-lettering, and fire-and-forget notification delivery.

#![allow(clippy::unwrap_used)]

use smallvec::{SmallVec, smallvec};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::effect::Effect;
use turnstile_core::event::SerializedEvent;
use turnstile_core::event_store::{EventStore, EventStoreError};
use turnstile_core::notify::{NotificationSink, Notice};
use turnstile_core::reducer::Reducer;
use turnstile_core::stream::{StreamId, Version};
use turnstile_core::{append_events, notify};
use turnstile_runtime::{RetryPolicy, Store};
use turnstile_testing::mocks::{FailingNotificationSink, InMemoryEventStore, RecordingNotificationSink};

#[derive(Clone, Debug, Default)]
struct JournalState {
    appended: usize,
    failures: usize,
}

#[derive(Clone, Debug)]
enum JournalAction {
    Record,
    Appended,
    AppendFailed,
    Announce,
}

#[derive(Clone)]
struct JournalEnvironment {
    event_store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
}

struct JournalReducer;

impl Reducer for JournalReducer {
    type State = JournalState;
    type Action = JournalAction;
    type Environment = JournalEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            JournalAction::Record => {
                let event = SerializedEvent::new("Recorded.v1".to_string(), vec![1], None);
                smallvec![append_events! {
                    store: env.event_store,
                    stream: "journal-1",
                    expected_version: None,
                    events: vec![event],
                    on_success: |_version| Some(JournalAction::Appended),
                    on_error: |_error| Some(JournalAction::AppendFailed)
                }]
            },
            JournalAction::Appended => {
                state.appended += 1;
                SmallVec::new()
            },
            JournalAction::AppendFailed => {
                state.failures += 1;
                SmallVec::new()
            },
            JournalAction::Announce => {
                smallvec![notify! {
                    sink: env.sink,
                    notice: Notice::new("user-1", "journal.recorded", serde_json::json!({}))
                }]
            },
        }
    }
}

/// Event store that refuses every append.
struct BrokenStore;

impl EventStore for BrokenStore {
    fn append_events(
        &self,
        _stream_id: StreamId,
        _expected_version: Option<Version>,
        _events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async { Err(EventStoreError::StorageError("disk on fire".to_string())) })
    }

    fn load_events(
        &self,
        _stream_id: StreamId,
        _from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[tokio::test]
async fn successful_appends_feed_their_callback_back() {
    let event_store = Arc::new(InMemoryEventStore::new());
    let store = Arc::new(Store::new(
        JournalState::default(),
        JournalReducer,
        JournalEnvironment {
            event_store: Arc::clone(&event_store) as Arc<dyn EventStore>,
            sink: Arc::new(RecordingNotificationSink::new()),
        },
    ));

    let handle = store.send(JournalAction::Record).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(2)).await.unwrap();

    assert_eq!(store.state(|s| s.appended).await, 1);
    assert_eq!(event_store.stream_len(&StreamId::new("journal-1")), 1);
    assert!(store.dlq().is_empty());
}

#[tokio::test]
async fn exhausted_appends_are_dead_lettered() {
    let store = Arc::new(Store::with_retry_policy(
        JournalState::default(),
        JournalReducer,
        JournalEnvironment {
            event_store: Arc::new(BrokenStore),
            sink: Arc::new(RecordingNotificationSink::new()),
        },
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        },
    ));

    let handle = store.send(JournalAction::Record).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(2)).await.unwrap();

    // The on_error callback ran and the operation is parked for operators.
    assert_eq!(store.state(|s| s.failures).await, 1);
    let letters = store.dlq().drain();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 2);
    assert!(letters[0].error.contains("disk on fire"));
}

#[tokio::test]
async fn notification_delivery_is_recorded() {
    let sink = Arc::new(RecordingNotificationSink::new());
    let store = Arc::new(Store::new(
        JournalState::default(),
        JournalReducer,
        JournalEnvironment {
            event_store: Arc::new(InMemoryEventStore::new()),
            sink: Arc::clone(&sink) as Arc<dyn NotificationSink>,
        },
    ));

    let handle = store.send(JournalAction::Announce).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(2)).await.unwrap();

    assert_eq!(sink.kinds(), vec!["journal.recorded"]);
}

#[tokio::test]
async fn failing_sinks_are_swallowed() {
    let store = Arc::new(Store::new(
        JournalState::default(),
        JournalReducer,
        JournalEnvironment {
            event_store: Arc::new(InMemoryEventStore::new()),
            sink: Arc::new(FailingNotificationSink),
        },
    ));

    // The handle completes normally; the failure is logged, not surfaced.
    let handle = store.send(JournalAction::Announce).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(store.pending_effects(), 0);
}
