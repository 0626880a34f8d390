//! The per-event registry aggregate.
//!
//! One reducer owns the whole registration domain of one event. Its three
//! concerns live in their own modules — the registration state machine,
//! the FIFO waitlist, and the transfer workflow — but they share one state
//! and one action stream, because they share one invariant: the capacity
//! ledger. Cancelling a registration releases a slot and promotes the
//! waitlist head *inside the same reduce call*, so freed capacity is never
//! left unclaimed and never double-granted.

pub mod registration;
pub mod transfer;
pub mod waitlist;

pub use registration::RegistrationAction;
pub use transfer::TransferAction;
pub use waitlist::WaitlistAction;

use crate::config::EnginePolicy;
use crate::error::RegistrationError;
use crate::events::RegistryEvent;
use crate::payment::PaymentGateway;
use crate::types::RegistryState;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;
use turnstile_core::append_events;
use turnstile_core::effect::Effect;
use turnstile_core::environment::Clock;
use turnstile_core::event_store::EventStore;
use turnstile_core::notify::NotificationSink;
use turnstile_core::reducer::Reducer;
use turnstile_core::stream::StreamId;

/// Effect vector produced by the registry reducer.
pub(crate) type Effects = SmallVec<[Effect<RegistryAction>; 4]>;

/// All inputs to the registry aggregate, grouped by concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegistryAction {
    /// Registration state machine commands and events.
    Registration(RegistrationAction),
    /// Waitlist queue commands and events.
    Waitlist(WaitlistAction),
    /// Transfer workflow commands and events.
    Transfer(TransferAction),
}

impl From<RegistrationAction> for RegistryAction {
    fn from(action: RegistrationAction) -> Self {
        Self::Registration(action)
    }
}

impl From<WaitlistAction> for RegistryAction {
    fn from(action: WaitlistAction) -> Self {
        Self::Waitlist(action)
    }
}

impl From<TransferAction> for RegistryAction {
    fn from(action: TransferAction) -> Self {
        Self::Transfer(action)
    }
}

/// Environment dependencies for the registry aggregate.
#[derive(Clone)]
pub struct RegistryEnvironment {
    /// Clock for deadlines, lead times, and timestamps.
    pub clock: Arc<dyn Clock>,
    /// Event stream persistence.
    pub event_store: Arc<dyn EventStore>,
    /// Fire-and-forget notification delivery.
    pub notifications: Arc<dyn NotificationSink>,
    /// External payment processor.
    pub gateway: Arc<dyn PaymentGateway>,
    /// This event's stream.
    pub stream_id: StreamId,
    /// Deadlines, lead times, and pricing.
    pub policy: EnginePolicy,
}

impl RegistryEnvironment {
    /// Creates a new `RegistryEnvironment`.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_store: Arc<dyn EventStore>,
        notifications: Arc<dyn NotificationSink>,
        gateway: Arc<dyn PaymentGateway>,
        stream_id: StreamId,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            clock,
            event_store,
            notifications,
            gateway,
            stream_id,
            policy,
        }
    }
}

/// Reducer for the registry aggregate.
#[derive(Clone, Debug, Default)]
pub struct RegistryReducer;

impl RegistryReducer {
    /// Creates a new `RegistryReducer`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for RegistryReducer {
    type State = RegistryState;
    type Action = RegistryAction;
    type Environment = RegistryEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RegistryAction::Registration(action) => registration::handle(state, action, env),
            RegistryAction::Waitlist(action) => waitlist::handle(state, action, env),
            RegistryAction::Transfer(action) => transfer::handle(state, action, env),
        }
    }
}

/// Persist one domain event to this event's stream.
///
/// Appends use `expected_version: None`: the per-event store is the
/// stream's single writer, so there is no concurrent writer to detect.
/// Append failures are retried and dead-lettered by the runtime.
pub(crate) fn persist(event: RegistryEvent, env: &RegistryEnvironment) -> Effect<RegistryAction> {
    match event.serialize() {
        Ok(serialized) => append_events! {
            store: env.event_store,
            stream: env.stream_id.as_str(),
            expected_version: None,
            events: vec![serialized],
            on_success: |_version| None,
            on_error: |_error| None
        },
        Err(error) => {
            tracing::error!(%error, stream_id = %env.stream_id, "failed to serialize domain event");
            Effect::None
        },
    }
}

/// Record a command rejection. Rejections are logged and stored for the
/// facade to translate into a typed error; they mutate no ledger state and
/// persist no event.
pub(crate) fn reject(state: &mut RegistryState, error: RegistrationError) {
    tracing::warn!(%error, event_id = %state.event.id, "command rejected");
    state.last_rejection = Some(error);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{RegistrationAction, RegistryAction, RegistryEnvironment};
    use crate::config::EnginePolicy;
    use crate::payment::{PaymentGateway, PaymentGatewayError, PaymentSession};
    use crate::types::{
        AttendeeSnapshot, Capacity, Event, EventStatus, Money, PaymentMethod, Registration,
        RegistrationId, ReputationScore, UserId,
    };
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use turnstile_core::environment::Clock;
    use turnstile_core::stream::StreamId;
    use turnstile_testing::mocks::{
        InMemoryEventStore, RecordingNotificationSink, SteppingClock, test_clock,
    };

    pub(crate) struct NullGateway;

    impl PaymentGateway for NullGateway {
        fn authorize(
            &self,
            registration: Registration,
        ) -> Pin<Box<dyn Future<Output = Result<PaymentSession, PaymentGatewayError>> + Send + '_>>
        {
            Box::pin(async move { Ok(PaymentSession::new(format!("sess-{}", registration.id))) })
        }
    }

    pub(crate) fn stepping_clock() -> Arc<SteppingClock> {
        Arc::new(SteppingClock::starting_now())
    }

    pub(crate) fn env_with_clock(clock: Arc<SteppingClock>) -> RegistryEnvironment {
        RegistryEnvironment::new(
            clock,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(RecordingNotificationSink::new()),
            Arc::new(NullGateway),
            StreamId::new("event-test"),
            EnginePolicy::default(),
        )
    }

    pub(crate) fn test_env() -> RegistryEnvironment {
        env_with_clock(stepping_clock())
    }

    /// A published event starting one week after the test clock origin.
    pub(crate) fn published_event(capacity: u32, deposit_cents: u64) -> Event {
        let mut event = Event::new(
            "Oficina de Rust",
            Capacity::new(capacity),
            Money::from_cents(deposit_cents),
            test_clock().now() + chrono::Duration::days(7),
        );
        event.status = EventStatus::Published;
        event
    }

    pub(crate) fn attendee(name: &str) -> AttendeeSnapshot {
        AttendeeSnapshot {
            full_name: name.to_string(),
            document: "52998224725".to_string(),
            phone: "+55 11 98888-0001".to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        }
    }

    /// A register command. Reputation 90 on a sub-minimum deposit makes it
    /// exempt; reputation 0 on a real deposit keeps it priced.
    pub(crate) fn register(
        registration_id: RegistrationId,
        user_id: UserId,
        name: &str,
        reputation_tenths: u16,
    ) -> RegistryAction {
        RegistrationAction::Register {
            registration_id,
            user_id,
            attendee: attendee(name),
            reputation: ReputationScore::from_tenths(reputation_tenths),
            method: PaymentMethod::Card,
        }
        .into()
    }
}
