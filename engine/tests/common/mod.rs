//! Shared fixtures for the engine integration tests.

#![allow(dead_code)] // Not every test binary uses every fixture.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use turnstile_core::environment::Clock;
use turnstile_engine::payment::{PaymentGateway, PaymentGatewayError, PaymentSession};
use turnstile_engine::profile::{ProfileDirectory, ProfileError, ProfileSnapshot};
use turnstile_engine::{
    AttendeeSnapshot, Capacity, EngineConfig, Event, Money, Registration, RegistrationEngine,
    ReputationScore, UserId,
};
use turnstile_testing::mocks::{InMemoryEventStore, RecordingNotificationSink, SteppingClock};

/// Gateway that hands out sessions; optionally refuses.
pub struct ScriptedGateway {
    refuse: Mutex<bool>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            refuse: Mutex::new(false),
        }
    }

    pub fn refuse_authorizations(&self, refuse: bool) {
        *self.refuse.lock().unwrap_or_else(PoisonError::into_inner) = refuse;
    }
}

impl PaymentGateway for ScriptedGateway {
    fn authorize(
        &self,
        registration: Registration,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentSession, PaymentGatewayError>> + Send + '_>>
    {
        let refuse = *self.refuse.lock().unwrap_or_else(PoisonError::into_inner);
        Box::pin(async move {
            if refuse {
                Err(PaymentGatewayError::Unavailable("scripted outage".to_string()))
            } else {
                Ok(PaymentSession::new(format!("sess-{}", registration.id)))
            }
        })
    }
}

/// Fixed in-memory profile directory.
pub struct StaticDirectory {
    profiles: Mutex<HashMap<UserId, ProfileSnapshot>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, user_id: UserId, profile: ProfileSnapshot) {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, profile);
    }
}

impl ProfileDirectory for StaticDirectory {
    fn fetch(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<ProfileSnapshot, ProfileError>> + Send + '_>> {
        let result = self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
            .ok_or(ProfileError::UnknownUser(user_id));
        Box::pin(async move { result })
    }
}

pub fn profile(name: &str, reputation_tenths: u16) -> ProfileSnapshot {
    ProfileSnapshot {
        attendee: AttendeeSnapshot {
            full_name: name.to_string(),
            document: "52998224725".to_string(),
            phone: "+55 11 98888-0001".to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        },
        reputation: ReputationScore::from_tenths(reputation_tenths),
    }
}

/// Everything an integration test needs to drive the engine.
pub struct Harness {
    pub engine: Arc<RegistrationEngine>,
    pub clock: Arc<SteppingClock>,
    pub sink: Arc<RecordingNotificationSink>,
    pub directory: Arc<StaticDirectory>,
    pub event_store: Arc<InMemoryEventStore>,
    pub gateway: Arc<ScriptedGateway>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(SteppingClock::starting_now());
        let sink = Arc::new(RecordingNotificationSink::new());
        let directory = Arc::new(StaticDirectory::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let gateway = Arc::new(ScriptedGateway::new());

        let engine = Arc::new(RegistrationEngine::new(
            &EngineConfig::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&event_store) as _,
            Arc::clone(&sink) as _,
            Arc::clone(&gateway) as _,
            Arc::clone(&directory) as _,
        ));

        Self {
            engine,
            clock,
            sink,
            directory,
            event_store,
            gateway,
        }
    }

    /// Register a user profile and return its id.
    pub fn user(&self, name: &str, reputation_tenths: u16) -> UserId {
        let user_id = UserId::new();
        self.directory.insert(user_id, profile(name, reputation_tenths));
        user_id
    }

    /// A published-ready event starting 7 days out. An 80-cent deposit is
    /// exempt for high-reputation users; a 10000-cent deposit never is.
    pub fn event(&self, capacity: u32, deposit_cents: u64) -> Event {
        Event::new(
            "Conf. Turnstile",
            Capacity::new(capacity),
            Money::from_cents(deposit_cents),
            self.clock.now() + chrono::Duration::days(7),
        )
    }
}
