//! The registration engine facade.
//!
//! One engine instance hosts many events, each behind its own store — the
//! per-event serialization point. Callers (an HTTP API, a CLI, a batch job)
//! translate external requests into these operations; no wire format is
//! mandated here.
//!
//! Every operation dispatches a command and reads its typed outcome inside
//! the same critical section, so two users racing for the last slot each
//! get a truthful answer: one `Confirmed`/`PendingPayment`, the other
//! `Waitlisted`.

use crate::aggregates::{
    RegistrationAction, RegistryAction, RegistryEnvironment, RegistryReducer, TransferAction,
    WaitlistAction,
};
use crate::config::{EngineConfig, EnginePolicy};
use crate::error::RegistrationError;
use crate::events::RegistryEvent;
use crate::payment::{PaymentGateway, PaymentResult};
use crate::profile::{ProfileDirectory, ProfileError, ProfileSnapshot};
use crate::types::{
    Actor, CancellationReason, Event, EventId, EventStatus, PaymentMethod, Registration,
    RegistrationId, RegistrationStatus, RegistryState, TransferDecision, TransferRequest,
    TransferRequestId, UserId, WaitlistEntryId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use turnstile_core::environment::Clock;
use turnstile_core::event::DomainEvent;
use turnstile_core::event_store::EventStore;
use turnstile_core::notify::NotificationSink;
use turnstile_core::reducer::Reducer;
use turnstile_core::stream::StreamId;
use turnstile_runtime::{Store, StoreError};

type RegistryStore = Store<RegistryState, RegistryAction, RegistryEnvironment, RegistryReducer>;

/// What a registration attempt resulted in.
#[derive(Clone, Debug)]
pub enum RegistrationOutcome {
    /// Slot taken and confirmed (exempt price).
    Confirmed(Registration),
    /// Slot provisionally held; payment due before the deadline.
    PendingPayment(Registration),
    /// Event full; the caller was queued instead.
    Waitlisted {
        /// 1-based queue position.
        position: usize,
    },
}

/// Receipt for a waitlist join.
#[derive(Clone, Debug)]
pub struct WaitlistReceipt {
    /// The created entry.
    pub entry_id: WaitlistEntryId,
    /// 1-based queue position.
    pub position: usize,
}

/// A user's view of an event's waitlist.
#[derive(Clone, Debug)]
pub struct WaitlistSnapshot {
    /// The user's 1-based position, if queued.
    pub position: Option<usize>,
    /// Total users queued.
    pub queued: usize,
    /// Rough estimate of slots released per day, from recent history.
    /// Informational only.
    pub expected_releases_per_day: f64,
}

/// The registration and capacity lifecycle engine.
pub struct RegistrationEngine {
    stores: RwLock<HashMap<EventId, Arc<RegistryStore>>>,
    clock: Arc<dyn Clock>,
    event_store: Arc<dyn EventStore>,
    notifications: Arc<dyn NotificationSink>,
    gateway: Arc<dyn PaymentGateway>,
    profiles: Arc<dyn ProfileDirectory>,
    policy: EnginePolicy,
}

impl RegistrationEngine {
    /// Build an engine from configuration and its collaborator ports.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        event_store: Arc<dyn EventStore>,
        notifications: Arc<dyn NotificationSink>,
        gateway: Arc<dyn PaymentGateway>,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            clock,
            event_store,
            notifications,
            gateway,
            profiles,
            policy: config.policy(),
        }
    }

    fn environment_for(&self, event_id: EventId) -> RegistryEnvironment {
        RegistryEnvironment::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.event_store),
            Arc::clone(&self.notifications),
            Arc::clone(&self.gateway),
            StreamId::new(format!("event-{event_id}")),
            self.policy,
        )
    }

    /// Publish an event, opening it for registration. Capacity is fixed
    /// from here on.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ZeroCapacity`] for capacity-less events
    /// and [`RegistrationError::AlreadyPublished`] for duplicates.
    pub async fn publish(&self, mut event: Event) -> Result<EventId, RegistrationError> {
        if event.capacity.value() == 0 {
            return Err(RegistrationError::ZeroCapacity);
        }
        event.status = EventStatus::Published;
        let event_id = event.id;

        let mut stores = self.stores.write().await;
        if stores.contains_key(&event_id) {
            return Err(RegistrationError::AlreadyPublished);
        }

        let env = self.environment_for(event_id);
        let store = Arc::new(Store::new(
            RegistryState::new(event),
            RegistryReducer::new(),
            env,
        ));
        stores.insert(event_id, store);

        tracing::info!(%event_id, "event published");
        Ok(event_id)
    }

    /// Reopen a previously published event by replaying its stream from the
    /// event store (e.g. after a restart).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AlreadyPublished`] if the event is
    /// already open on this engine, and [`RegistrationError::Storage`] when
    /// the stream cannot be read or decoded.
    pub async fn reopen(&self, mut event: Event) -> Result<EventId, RegistrationError> {
        event.status = EventStatus::Published;
        let event_id = event.id;

        let mut stores = self.stores.write().await;
        if stores.contains_key(&event_id) {
            return Err(RegistrationError::AlreadyPublished);
        }

        let env = self.environment_for(event_id);
        let history = self
            .event_store
            .load_events(env.stream_id.clone(), None)
            .await
            .map_err(|e| RegistrationError::Storage(e.to_string()))?;

        let reducer = RegistryReducer::new();
        let mut state = RegistryState::new(event);
        let replayed = history.len();
        for serialized in history {
            let domain_event = RegistryEvent::from_bytes(&serialized.data)
                .map_err(|e| RegistrationError::Storage(e.to_string()))?;
            // Events replay as plain state mutation; they produce no effects.
            let _ = reducer.reduce(&mut state, domain_event.into(), &env);
        }

        stores.insert(event_id, Arc::new(Store::new(state, reducer, env)));
        tracing::info!(%event_id, replayed, "event reopened from stream");
        Ok(event_id)
    }

    /// Register a user for an event. Routes to the waitlist when full.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::AlreadyRegistered`] for duplicates,
    /// [`RegistrationError::RegistrationClosed`] outside the published
    /// window, plus profile/storage failures. Capacity exhaustion is not an
    /// error: it yields [`RegistrationOutcome::Waitlisted`].
    pub async fn register(
        &self,
        event_id: EventId,
        user_id: UserId,
        method: PaymentMethod,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let store = self.store(event_id).await?;
        let profile = self.profile(user_id).await?;

        let command = RegistrationAction::Register {
            registration_id: RegistrationId::new(),
            user_id,
            attendee: profile.attendee,
            reputation: profile.reputation,
            method,
        };

        let (outcome, _effects) = store
            .send_and_query(command.into(), move |state| {
                if let Some(error) = state.last_rejection.clone() {
                    return Err(error);
                }
                match state.active_registration_of(&user_id) {
                    Some(reg) if reg.status == RegistrationStatus::Confirmed => {
                        Ok(RegistrationOutcome::Confirmed(reg.clone()))
                    },
                    Some(reg) if reg.status == RegistrationStatus::Pending => {
                        Ok(RegistrationOutcome::PendingPayment(reg.clone()))
                    },
                    Some(reg) if reg.status == RegistrationStatus::Waitlisted => {
                        Ok(RegistrationOutcome::Waitlisted {
                            position: state.position_of(&user_id).unwrap_or(0),
                        })
                    },
                    _ => Err(RegistrationError::Storage(
                        "registration outcome unavailable".to_string(),
                    )),
                }
            })
            .await
            .map_err(store_error)?;

        outcome
    }

    /// Record the payment gateway's verdict for a registration.
    ///
    /// First writer wins against the expiry sweep: a verdict landing after
    /// the slot was reclaimed surfaces
    /// [`RegistrationError::ExpiredRegistration`].
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn payment_result(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
        result: PaymentResult,
    ) -> Result<Registration, RegistrationError> {
        let command = RegistrationAction::RecordPaymentResult {
            registration_id,
            result,
        };
        self.dispatch_expecting_registration(event_id, command.into(), registration_id)
            .await
    }

    /// Open a fresh payment session for a pending registration, e.g. after
    /// the gateway refused the first attempt or the capture was declined.
    ///
    /// The engine never retries the gateway on its own; this is the
    /// caller's retry path. The slot stays held until the deadline either
    /// way.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::PaymentGateway`] passes the gateway failure
    /// through opaquely; [`RegistrationError::InvalidTransition`] when the
    /// registration is no longer pending.
    pub async fn reauthorize_payment(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
    ) -> Result<crate::payment::PaymentSession, RegistrationError> {
        let store = self.store(event_id).await?;

        let registration = store
            .state(|state| state.registration(&registration_id).cloned())
            .await
            .ok_or(RegistrationError::UnknownRegistration)?;
        if registration.status != RegistrationStatus::Pending {
            return Err(RegistrationError::InvalidTransition {
                from: registration.status,
                attempted: "open a payment session".to_string(),
            });
        }

        let session = self
            .gateway
            .authorize(registration)
            .await
            .map_err(|e| RegistrationError::PaymentGateway(e.to_string()))?;

        let command = RegistrationAction::RecordPaymentSession {
            registration_id,
            session: session.clone(),
        };
        let (result, _effects) = store
            .send_and_query(command.into(), |state| {
                state.last_rejection.clone().map_or(Ok(()), Err)
            })
            .await
            .map_err(store_error)?;
        result?;

        Ok(session)
    }

    /// Cancel a registration. Releasing the slot promotes the waitlist
    /// head inside the same critical section.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn cancel(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
        reason: CancellationReason,
    ) -> Result<Registration, RegistrationError> {
        let command = RegistrationAction::Cancel {
            registration_id,
            reason,
        };
        self.dispatch_expecting_registration(event_id, command.into(), registration_id)
            .await
    }

    /// Check an attendee in at the door.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn check_in(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        let command = RegistrationAction::CheckIn { registration_id };
        self.dispatch_expecting_registration(event_id, command.into(), registration_id)
            .await
    }

    /// Read a registration. Due pending registrations are reconciled
    /// before the read, so an expired record never comes back as pending.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn registration(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
    ) -> Result<Option<Registration>, RegistrationError> {
        let store = self.store(event_id).await?;
        let (registration, _effects) = store
            .send_and_query(RegistrationAction::SweepDue.into(), move |state| {
                state.registration(&registration_id).cloned()
            })
            .await
            .map_err(store_error)?;
        Ok(registration)
    }

    /// Slots still available, after reconciling due expirations.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn available(&self, event_id: EventId) -> Result<u32, RegistrationError> {
        let store = self.store(event_id).await?;
        let (available, _effects) = store
            .send_and_query(RegistrationAction::SweepDue.into(), |state| {
                state.ledger.available()
            })
            .await
            .map_err(store_error)?;
        Ok(available)
    }

    /// Slots currently held, after reconciling due expirations.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn confirmed_count(&self, event_id: EventId) -> Result<u32, RegistrationError> {
        let store = self.store(event_id).await?;
        let (confirmed, _effects) = store
            .send_and_query(RegistrationAction::SweepDue.into(), |state| {
                state.ledger.confirmed_count()
            })
            .await
            .map_err(store_error)?;
        Ok(confirmed)
    }

    /// Join the waitlist of a full event.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::CapacityAvailable`] when slots are free,
    /// [`RegistrationError::AlreadyQueued`] /
    /// [`RegistrationError::AlreadyRegistered`] for duplicates.
    pub async fn join_waitlist(
        &self,
        event_id: EventId,
        user_id: UserId,
        method: PaymentMethod,
    ) -> Result<WaitlistReceipt, RegistrationError> {
        let store = self.store(event_id).await?;
        let profile = self.profile(user_id).await?;

        let command = WaitlistAction::Join {
            user_id,
            attendee: profile.attendee,
            reputation: profile.reputation,
            method,
        };

        let (receipt, _effects) = store
            .send_and_query(command.into(), move |state| {
                if let Some(error) = state.last_rejection.clone() {
                    return Err(error);
                }
                let entry_id = state
                    .queued_by_user
                    .get(&user_id)
                    .copied()
                    .ok_or_else(|| RegistrationError::Storage("entry unavailable".to_string()))?;
                Ok(WaitlistReceipt {
                    entry_id,
                    position: state.position_of(&user_id).unwrap_or(0),
                })
            })
            .await
            .map_err(store_error)?;

        receipt
    }

    /// Leave the waitlist.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotWaitlisted`] when the user is not queued.
    pub async fn leave_waitlist(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), RegistrationError> {
        let store = self.store(event_id).await?;
        let (result, _effects) = store
            .send_and_query(WaitlistAction::Leave { user_id }.into(), |state| {
                state.last_rejection.clone().map_or(Ok(()), Err)
            })
            .await
            .map_err(store_error)?;
        result
    }

    /// A user's view of the queue: position, queue length, and a rough
    /// slots-per-day estimate from recent release history.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn waitlist_status(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<WaitlistSnapshot, RegistrationError> {
        let store = self.store(event_id).await?;
        let now = self.clock.now();
        let (snapshot, _effects) = store
            .send_and_query(RegistrationAction::SweepDue.into(), move |state| {
                WaitlistSnapshot {
                    position: state.position_of(&user_id),
                    queued: state.queued_len(),
                    expected_releases_per_day: state.release_rate_per_day(now),
                }
            })
            .await
            .map_err(store_error)?;
        Ok(snapshot)
    }

    /// Offer a confirmed registration to another user.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::TransferNotAllowed`] on policy or lead-time
    /// violations.
    pub async fn create_transfer(
        &self,
        event_id: EventId,
        registration_id: RegistrationId,
        from_user: UserId,
        to_user: UserId,
        message: Option<String>,
    ) -> Result<TransferRequest, RegistrationError> {
        let store = self.store(event_id).await?;
        let request_id = TransferRequestId::new();

        let command = TransferAction::Create {
            request_id,
            registration_id,
            from_user,
            to_user,
            message,
        };

        let (request, _effects) = store
            .send_and_query(command.into(), move |state| {
                if let Some(error) = state.last_rejection.clone() {
                    return Err(error);
                }
                state
                    .transfer(&request_id)
                    .cloned()
                    .ok_or(RegistrationError::UnknownTransfer)
            })
            .await
            .map_err(store_error)?;

        request
    }

    /// Accept a transfer request. Only the recipient (or an administrator)
    /// may accept; the recipient's identity snapshot is captured now.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn accept_transfer(
        &self,
        event_id: EventId,
        request_id: TransferRequestId,
        actor: Actor,
    ) -> Result<TransferRequest, RegistrationError> {
        let store = self.store(event_id).await?;

        let to_user = store
            .state(|state| state.transfer(&request_id).map(|r| r.to_user))
            .await
            .ok_or(RegistrationError::UnknownTransfer)?;
        let profile = self.profile(to_user).await?;

        let decision = TransferDecision::Accept {
            recipient: profile.attendee,
            replacement_id: RegistrationId::new(),
        };
        self.resolve_transfer_with(store, request_id, decision, actor)
            .await
    }

    /// Deny a transfer request (recipient or administrator).
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn deny_transfer(
        &self,
        event_id: EventId,
        request_id: TransferRequestId,
        actor: Actor,
    ) -> Result<TransferRequest, RegistrationError> {
        let store = self.store(event_id).await?;
        self.resolve_transfer_with(store, request_id, TransferDecision::Deny, actor)
            .await
    }

    /// Withdraw a transfer request (holder or administrator).
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn cancel_transfer(
        &self,
        event_id: EventId,
        request_id: TransferRequestId,
        actor: Actor,
    ) -> Result<TransferRequest, RegistrationError> {
        let store = self.store(event_id).await?;
        self.resolve_transfer_with(store, request_id, TransferDecision::Cancel, actor)
            .await
    }

    /// Sweep one event's due pending registrations now.
    ///
    /// # Errors
    ///
    /// See [`RegistrationError`].
    pub async fn sweep(&self, event_id: EventId) -> Result<(), RegistrationError> {
        let store = self.store(event_id).await?;
        store
            .send(RegistrationAction::SweepDue.into())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Sweep every hosted event. Failures are logged per event, never
    /// propagated — the next tick retries.
    pub async fn sweep_all(&self) {
        let stores: Vec<_> = {
            let guard = self.stores.read().await;
            guard.iter().map(|(id, s)| (*id, Arc::clone(s))).collect()
        };

        for (event_id, store) in stores {
            if let Err(error) = store.send(RegistrationAction::SweepDue.into()).await {
                tracing::warn!(%event_id, %error, "sweep skipped");
            }
        }
    }

    /// Wait until one event's in-flight effects have drained. Useful in
    /// tests and before shutdown checks.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Storage`] if effects do not settle in time.
    pub async fn settle(&self, event_id: EventId, timeout: Duration) -> Result<(), RegistrationError> {
        let store = self.store(event_id).await?;
        store.settle(timeout).await.map_err(store_error)
    }

    /// Gracefully shut down every store.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Storage`] if effects are still running at the
    /// deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RegistrationError> {
        let stores: Vec<_> = {
            let guard = self.stores.read().await;
            guard.values().cloned().collect()
        };
        for store in stores {
            store.shutdown(timeout).await.map_err(store_error)?;
        }
        Ok(())
    }

    async fn resolve_transfer_with(
        &self,
        store: Arc<RegistryStore>,
        request_id: TransferRequestId,
        decision: TransferDecision,
        resolved_by: Actor,
    ) -> Result<TransferRequest, RegistrationError> {
        let command = TransferAction::Resolve {
            request_id,
            decision,
            resolved_by,
        };

        let (request, _effects) = store
            .send_and_query(command.into(), move |state| {
                if let Some(error) = state.last_rejection.clone() {
                    return Err(error);
                }
                state
                    .transfer(&request_id)
                    .cloned()
                    .ok_or(RegistrationError::UnknownTransfer)
            })
            .await
            .map_err(store_error)?;

        request
    }

    async fn dispatch_expecting_registration(
        &self,
        event_id: EventId,
        action: RegistryAction,
        registration_id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        let store = self.store(event_id).await?;
        let (result, _effects) = store
            .send_and_query(action, move |state| {
                if let Some(error) = state.last_rejection.clone() {
                    return Err(error);
                }
                state
                    .registration(&registration_id)
                    .cloned()
                    .ok_or(RegistrationError::UnknownRegistration)
            })
            .await
            .map_err(store_error)?;
        result
    }

    async fn store(&self, event_id: EventId) -> Result<Arc<RegistryStore>, RegistrationError> {
        self.stores
            .read()
            .await
            .get(&event_id)
            .cloned()
            .ok_or(RegistrationError::UnknownEvent)
    }

    async fn profile(&self, user_id: UserId) -> Result<ProfileSnapshot, RegistrationError> {
        self.profiles.fetch(user_id).await.map_err(|e| match e {
            ProfileError::UnknownUser(_) => RegistrationError::UnknownUser,
            ProfileError::Unavailable(message) => RegistrationError::Storage(message),
        })
    }
}

fn store_error(error: StoreError) -> RegistrationError {
    RegistrationError::Storage(error.to_string())
}
