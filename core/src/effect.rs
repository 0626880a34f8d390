//! Side-effect descriptions returned by reducers.
//!
//! Effects are values, not executions. A reducer that wants to persist an
//! event, deliver a notification, or schedule a payment-deadline check
//! returns the corresponding `Effect` variant; the runtime's store executes
//! it asynchronously and feeds any resulting action back into the reducer.
//! This keeps reducers pure and makes every side effect of a state
//! transition part of the visible contract instead of a hidden hook.

use crate::event::SerializedEvent;
use crate::event_store::{EventStore, EventStoreError};
use crate::notify::{NotificationSink, Notice};
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with the outcome of an asynchronous operation; the
/// returned action (if any) is fed back into the reducer.
pub type EffectCallback<In, Action> = Box<dyn FnOnce(In) -> Option<Action> + Send>;

/// Effect type — describes a side effect to be executed by the runtime.
///
/// # Type Parameters
///
/// - `Action`: the action type that effects can produce (feedback loop)
pub enum Effect<Action> {
    /// No-op effect.
    None,

    /// Run effects concurrently.
    Parallel(Vec<Effect<Action>>),

    /// Run effects one after another.
    Sequential(Vec<Effect<Action>>),

    /// Dispatch an action after a delay (payment deadlines, offer expiry).
    ///
    /// Delayed actions are scheduled, not tracked: they fire on their own
    /// schedule and re-enter the store like any other command.
    Delay {
        /// How long to wait.
        duration: Duration,
        /// Action to dispatch after the delay.
        action: Box<Action>,
    },

    /// Arbitrary async computation; a `Some` result is fed back into the
    /// reducer.
    Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

    /// Event store operation (persist events with retry + dead-lettering).
    EventStore(EventStoreOperation<Action>),

    /// Fire-and-forget notification delivery. Failures are logged by the
    /// executor and never fed back.
    Notify(NotifyOperation),
}

/// Operations against the event store, executed by the runtime.
pub enum EventStoreOperation<Action> {
    /// Append events to a stream.
    AppendEvents {
        /// The store to append to.
        event_store: Arc<dyn EventStore>,
        /// The stream to append to.
        stream_id: StreamId,
        /// Optimistic concurrency assertion (`None` = unconditional).
        expected_version: Option<Version>,
        /// Events to persist.
        events: Vec<SerializedEvent>,
        /// Called with the new stream version on success.
        on_success: EffectCallback<Version, Action>,
        /// Called with the terminal error after retries are exhausted.
        on_error: EffectCallback<EventStoreError, Action>,
    },
}

/// A notification delivery, bound to its sink.
pub struct NotifyOperation {
    /// The sink to deliver through.
    pub sink: Arc<dyn NotificationSink>,
    /// The notice to deliver.
    pub notice: Notice,
}

impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Effect::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Effect::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            Effect::EventStore(EventStoreOperation::AppendEvents {
                stream_id, events, ..
            }) => f
                .debug_struct("Effect::AppendEvents")
                .field("stream_id", stream_id)
                .field("events", &events.len())
                .finish(),
            Effect::Notify(op) => f
                .debug_struct("Effect::Notify")
                .field("recipient", &op.notice.recipient)
                .field("kind", &op.notice.kind)
                .finish(),
        }
    }
}

impl<Action> Effect<Action> {
    /// Combine effects to run concurrently.
    #[must_use]
    pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Parallel(effects)
    }

    /// Chain effects to run sequentially.
    #[must_use]
    pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    enum TestAction {
        Tick,
    }

    #[test]
    fn debug_formats_without_panicking() {
        let delay: Effect<TestAction> = Effect::Delay {
            duration: Duration::from_secs(1),
            action: Box::new(TestAction::Tick),
        };
        assert!(format!("{delay:?}").contains("Effect::Delay"));

        let future: Effect<TestAction> = Effect::Future(Box::pin(async { None }));
        assert_eq!(format!("{future:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn merge_and_chain_wrap_variants() {
        let merged: Effect<TestAction> = Effect::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(merged, Effect::Parallel(v) if v.len() == 2));

        let chained: Effect<TestAction> = Effect::chain(vec![Effect::None]);
        assert!(matches!(chained, Effect::Sequential(v) if v.len() == 1));
    }
}
