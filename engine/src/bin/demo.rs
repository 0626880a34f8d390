//! End-to-end walkthrough of the registration lifecycle.
//!
//! Publishes a capacity-1 event, registers one attendee (exempt price,
//! auto-confirmed), waitlists a second, then cancels the first and watches
//! the waitlist promotion claim the freed slot.

use anyhow::Result;
use chrono::Duration;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use turnstile_core::environment::{Clock, SystemClock};
use turnstile_core::notify::{NotificationSink, Notice, NotifyError};
use turnstile_engine::payment::{PaymentGateway, PaymentGatewayError, PaymentSession};
use turnstile_engine::profile::{ProfileDirectory, ProfileError, ProfileSnapshot};
use turnstile_engine::{
    AttendeeSnapshot, CancellationReason, Capacity, EngineConfig, Event, Money, PaymentMethod,
    Registration, RegistrationEngine, RegistrationOutcome, ReputationScore, UserId,
};
use turnstile_testing::mocks::InMemoryEventStore;

/// Prints every notice instead of delivering it anywhere.
struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(
        &self,
        notice: Notice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        tracing::info!(recipient = %notice.recipient, kind = %notice.kind, "notice");
        Box::pin(async { Ok(()) })
    }
}

/// Approves every session it is asked to open.
struct AutoGateway;

impl PaymentGateway for AutoGateway {
    fn authorize(
        &self,
        registration: Registration,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentSession, PaymentGatewayError>> + Send + '_>>
    {
        Box::pin(async move { Ok(PaymentSession::new(format!("demo-{}", registration.id))) })
    }
}

/// Fixed in-process directory of demo attendees.
struct DemoDirectory {
    profiles: HashMap<UserId, ProfileSnapshot>,
}

impl ProfileDirectory for DemoDirectory {
    fn fetch(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<ProfileSnapshot, ProfileError>> + Send + '_>> {
        let result = self
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(ProfileError::UnknownUser(user_id));
        Box::pin(async move { result })
    }
}

fn profile(name: &str, reputation_tenths: u16) -> ProfileSnapshot {
    ProfileSnapshot {
        attendee: AttendeeSnapshot {
            full_name: name.to_string(),
            document: format!("{:011}", name.len() * 1_234_567),
            phone: "+55 11 99999-0000".to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        },
        reputation: ReputationScore::from_tenths(reputation_tenths),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let alice = UserId::new();
    let bruno = UserId::new();

    let mut profiles = HashMap::new();
    profiles.insert(alice, profile("Alice Prado", 90));
    profiles.insert(bruno, profile("Bruno Costa", 62));

    let engine = RegistrationEngine::new(
        &config,
        Arc::clone(&clock),
        Arc::new(InMemoryEventStore::new()),
        Arc::new(LogSink),
        Arc::new(AutoGateway),
        Arc::new(DemoDirectory { profiles }),
    );

    // One slot, 90-cent deposit: with any discount the price drops below
    // the minimum payable amount, so registrations auto-confirm.
    let event = Event::new(
        "Rust Meetup — Capacity Lifecycle Edition",
        Capacity::new(1),
        Money::from_cents(90),
        clock.now() + Duration::days(3),
    );
    let event_id = engine.publish(event).await?;

    let alice_registration = match engine.register(event_id, alice, PaymentMethod::Pix).await? {
        RegistrationOutcome::Confirmed(reg) => {
            tracing::info!(ticket = %reg.ticket_code, "alice confirmed");
            reg
        },
        other => anyhow::bail!("unexpected outcome for alice: {other:?}"),
    };
    tracing::info!(available = engine.available(event_id).await?, "after alice");

    match engine.register(event_id, bruno, PaymentMethod::Card).await? {
        RegistrationOutcome::Waitlisted { position } => {
            tracing::info!(position, "bruno waitlisted");
        },
        other => anyhow::bail!("unexpected outcome for bruno: {other:?}"),
    }

    if let Err(error) = engine.register(event_id, alice, PaymentMethod::Pix).await {
        tracing::info!(%error, "alice registering twice is refused");
    }

    // Alice frees her slot; promotion runs in the same critical section
    // and hands it straight to Bruno.
    engine
        .cancel(event_id, alice_registration.id, CancellationReason::Attendee)
        .await?;

    let snapshot = engine.waitlist_status(event_id, bruno).await?;
    tracing::info!(
        queued = snapshot.queued,
        available = engine.available(event_id).await?,
        releases_per_day = snapshot.expected_releases_per_day,
        "after alice cancelled"
    );

    engine.settle(event_id, std::time::Duration::from_secs(5)).await?;
    engine.shutdown(std::time::Duration::from_secs(5)).await?;
    tracing::info!("demo complete");

    Ok(())
}
