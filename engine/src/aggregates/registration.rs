//! Registration state machine.
//!
//! Owns the lifecycle of one registration record:
//!
//! ```text
//! (none) ──register──► Pending ──payment approved──► Confirmed ──► CheckedIn
//!    │                    │                              │
//!    │ exempt price       │ deadline / explicit cancel   │ cancel (before start)
//!    ▼                    ▼                              ▼
//! Confirmed            Cancelled ◄──────────────────  Cancelled
//!                                                       │ transfer accepted
//!                                                       ▼
//!                                                   Transferred
//! ```
//!
//! Cancelled and Transferred are terminal; a new registration is a new
//! entity. A reservation failure (capacity exhausted) is not an error —
//! the caller is routed to the waitlist instead. Expiry races with payment
//! confirmation resolve first-writer-wins: whichever lands first through
//! the store wins, and the loser becomes an idempotent no-op.

use super::{Effects, RegistryAction, RegistryEnvironment, WaitlistAction, persist, reject, waitlist};
use crate::error::RegistrationError;
use crate::events::RegistryEvent;
use crate::payment::{PaymentResult, PaymentSession};
use crate::types::{
    AttendeeSnapshot, CancellationReason, EventStatus, PaymentMethod, PaymentStatus, Registration,
    RegistrationId, RegistrationStatus, RegistryState, ReputationScore, TicketCode, UserId,
    WaitlistStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smallvec::SmallVec;
use std::sync::Arc;
use turnstile_core::notify::Notice;
use turnstile_core::{async_effect, delay, notify};
use turnstile_macros::Action;

/// Actions for the registration state machine.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum RegistrationAction {
    // Commands
    /// Submit a registration. Routes to the waitlist when the event is
    /// full.
    #[command]
    Register {
        /// Identity for the new registration.
        registration_id: RegistrationId,
        /// The registrant.
        user_id: UserId,
        /// Identity snapshot captured by the caller at submission time.
        attendee: AttendeeSnapshot,
        /// Reputation score feeding the pricing policy.
        reputation: ReputationScore,
        /// Chosen payment method.
        method: PaymentMethod,
    },

    /// Record the gateway's verdict on a payment session.
    #[command]
    RecordPaymentResult {
        /// The registration paid for.
        registration_id: RegistrationId,
        /// The gateway's verdict.
        result: PaymentResult,
    },

    /// Record a payment session the gateway opened for a pending
    /// registration.
    #[command]
    RecordPaymentSession {
        /// The registration being paid for.
        registration_id: RegistrationId,
        /// The opened session.
        session: PaymentSession,
    },

    /// Record that the gateway refused to open a payment session.
    #[command]
    RecordAuthorizationFailure {
        /// The registration being paid for.
        registration_id: RegistrationId,
        /// Gateway error, verbatim.
        error: String,
    },

    /// Cancel a registration (attendee- or organizer-initiated).
    #[command]
    Cancel {
        /// The registration to cancel.
        registration_id: RegistrationId,
        /// Who initiated the cancellation.
        reason: CancellationReason,
    },

    /// Check the attendee in at the door.
    #[command]
    CheckIn {
        /// The registration checking in.
        registration_id: RegistrationId,
    },

    /// Reclaim one registration's slot if its payment deadline passed.
    /// Scheduled when the registration is created.
    #[command]
    Expire {
        /// The registration to check.
        registration_id: RegistrationId,
    },

    /// Reclaim every due pending registration. Runs lazily ahead of reads
    /// and writes, and periodically from the sweeper.
    #[command]
    SweepDue,

    // Events
    /// A registration was created (pending payment, or directly confirmed
    /// when the price is exempt).
    #[event]
    RegistrationCreated {
        /// The created registration.
        registration: Registration,
    },

    /// The gateway opened a payment session.
    #[event]
    PaymentSessionOpened {
        /// The registration being paid for.
        registration_id: RegistrationId,
        /// The opened session.
        session: PaymentSession,
    },

    /// The gateway refused to open a payment session. The registration
    /// stays pending until the deadline; the caller may retry.
    #[event]
    PaymentAuthorizationFailed {
        /// The registration being paid for.
        registration_id: RegistrationId,
        /// Gateway error, verbatim.
        error: String,
    },

    /// Payment settled; the registration is confirmed.
    #[event]
    RegistrationConfirmed {
        /// The confirmed registration.
        registration_id: RegistrationId,
        /// When it was confirmed.
        confirmed_at: DateTime<Utc>,
    },

    /// The gateway declined the capture. The slot stays held until the
    /// deadline so the holder may retry.
    #[event]
    PaymentDeclined {
        /// The registration whose capture failed.
        registration_id: RegistrationId,
        /// Gateway-provided reason.
        reason: String,
        /// When the decline landed.
        declined_at: DateTime<Utc>,
    },

    /// The registration was cancelled; a held slot was released.
    #[event]
    RegistrationCancelled {
        /// The cancelled registration.
        registration_id: RegistrationId,
        /// Why it was cancelled.
        reason: CancellationReason,
        /// Whether an approved payment was marked refunded.
        refunded: bool,
        /// When it was cancelled.
        cancelled_at: DateTime<Utc>,
    },

    /// The attendee checked in at the door.
    #[event]
    CheckedIn {
        /// The registration checked in.
        registration_id: RegistrationId,
        /// When.
        checked_in_at: DateTime<Utc>,
    },
}

pub(crate) fn handle(
    state: &mut RegistryState,
    action: RegistrationAction,
    env: &RegistryEnvironment,
) -> Effects {
    match action {
        RegistrationAction::Register {
            registration_id,
            user_id,
            attendee,
            reputation,
            method,
        } => register(state, env, registration_id, user_id, attendee, reputation, method),
        RegistrationAction::RecordPaymentResult {
            registration_id,
            result,
        } => record_payment_result(state, env, registration_id, result),
        RegistrationAction::RecordPaymentSession {
            registration_id,
            session,
        } => record_payment_session(state, env, registration_id, session),
        RegistrationAction::RecordAuthorizationFailure {
            registration_id,
            error,
        } => record_authorization_failure(state, env, registration_id, &error),
        RegistrationAction::Cancel {
            registration_id,
            reason,
        } => cancel(state, env, registration_id, reason),
        RegistrationAction::CheckIn { registration_id } => check_in(state, env, registration_id),
        RegistrationAction::Expire { registration_id } => {
            state.last_rejection = None;
            let mut effects = Effects::new();
            expire_if_due(state, env, registration_id, &mut effects);
            effects
        },
        RegistrationAction::SweepDue => {
            state.last_rejection = None;
            sweep_due(state, env)
        },
        // Events (from the store's feedback loop or stream replay)
        event => {
            apply(state, &event);
            SmallVec::new()
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn register(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    user_id: UserId,
    attendee: AttendeeSnapshot,
    reputation: ReputationScore,
    method: PaymentMethod,
) -> Effects {
    state.last_rejection = None;

    // Reclaim any due slots first, so an abandoned pending registration
    // cannot block a live registrant.
    let mut effects = sweep_due(state, env);

    if state.event.status != EventStatus::Published {
        reject(state, RegistrationError::RegistrationClosed);
        return effects;
    }

    if state.active_by_user.contains_key(&user_id) {
        reject(state, RegistrationError::AlreadyRegistered);
        return effects;
    }

    if state.ledger.available() == 0 {
        // Not an error: the full house routes the caller to the waitlist.
        waitlist::join(state, env, user_id, attendee, reputation, method, &mut effects);
        return effects;
    }

    let now = env.clock.now();
    let quote = env.policy.pricing.quote(state.event.deposit, reputation);
    let exempt = env.policy.pricing.is_exempt(&quote);

    let registration = Registration {
        id: registration_id,
        event_id: state.event.id,
        user_id,
        attendee,
        status: if exempt {
            RegistrationStatus::Confirmed
        } else {
            RegistrationStatus::Pending
        },
        payment_status: if exempt {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Pending
        },
        method: if exempt { PaymentMethod::Exempt } else { method },
        original_price: quote.original,
        discount: quote.discount,
        final_price: quote.final_price,
        expires_at: (!exempt).then(|| now + env.policy.payment_deadline),
        payment_session: None,
        checked_in: false,
        checked_in_at: None,
        cancelled_reason: None,
        ticket_code: TicketCode::new(),
        created_at: now,
    };

    let event = RegistrationAction::RegistrationCreated {
        registration: registration.clone(),
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Registration(event), env));

    if exempt {
        effects.push(notify! {
            sink: env.notifications,
            notice: Notice::new(
                user_id.to_string(),
                "registration.confirmed",
                json!({
                    "registration_id": registration.id.to_string(),
                    "ticket_code": registration.ticket_code.to_string(),
                })
            )
        });
    } else {
        effects.push(notify! {
            sink: env.notifications,
            notice: Notice::new(
                user_id.to_string(),
                "registration.pending_payment",
                json!({
                    "registration_id": registration.id.to_string(),
                    "amount_cents": registration.final_price.cents(),
                    "expires_at": registration.expires_at,
                })
            )
        });
        push_payment_effects(env, registration, &mut effects);
    }

    effects
}

/// Schedule the payment-deadline check and open a gateway session for a
/// pending registration. Shared with waitlist promotion.
pub(crate) fn push_payment_effects(
    env: &RegistryEnvironment,
    registration: Registration,
    effects: &mut Effects,
) {
    let registration_id = registration.id;
    let deadline = env.policy.payment_deadline.to_std().unwrap_or_default();

    effects.push(delay! {
        duration: deadline,
        action: RegistryAction::Registration(RegistrationAction::Expire { registration_id })
    });

    let gateway = Arc::clone(&env.gateway);
    effects.push(async_effect! {
        match gateway.authorize(registration).await {
            Ok(session) => Some(RegistryAction::Registration(
                RegistrationAction::RecordPaymentSession {
                    registration_id,
                    session,
                },
            )),
            Err(error) => Some(RegistryAction::Registration(
                RegistrationAction::RecordAuthorizationFailure {
                    registration_id,
                    error: error.to_string(),
                },
            )),
        }
    });
}

fn record_payment_session(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    session: PaymentSession,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };
    if registration.status != RegistrationStatus::Pending {
        // The registration resolved before the session came back.
        tracing::debug!(%registration_id, "payment session for a settled registration ignored");
        return effects;
    }

    let event = RegistrationAction::PaymentSessionOpened {
        registration_id,
        session,
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Registration(event), env));
    effects
}

fn record_authorization_failure(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    error: &str,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };
    if registration.status != RegistrationStatus::Pending {
        return effects;
    }

    let event = RegistrationAction::PaymentAuthorizationFailed {
        registration_id,
        error: error.to_string(),
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Registration(event), env));
    effects
}

fn record_payment_result(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    result: PaymentResult,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };

    match (registration.status, result) {
        (RegistrationStatus::Pending, PaymentResult::Approved) => {
            let now = env.clock.now();
            let user_id = registration.user_id;
            let ticket_code = registration.ticket_code;

            let event = RegistrationAction::RegistrationConfirmed {
                registration_id,
                confirmed_at: now,
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Registration(event), env));

            // A notified waitlist user who pays takes their offered slot.
            if let Some(entry) = state.entry_for_registration(&registration_id) {
                if entry.status == WaitlistStatus::Notified {
                    let entry_id = entry.id;
                    let accepted = WaitlistAction::WaitlistEntryAccepted {
                        entry_id,
                        accepted_at: now,
                    };
                    waitlist::apply(state, &accepted);
                    effects.push(persist(RegistryEvent::Waitlist(accepted), env));
                }
            }

            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    user_id.to_string(),
                    "registration.confirmed",
                    json!({
                        "registration_id": registration_id.to_string(),
                        "ticket_code": ticket_code.to_string(),
                    })
                )
            });
        },

        (RegistrationStatus::Pending, PaymentResult::Declined { reason }) => {
            let user_id = registration.user_id;
            let event = RegistrationAction::PaymentDeclined {
                registration_id,
                reason: reason.clone(),
                declined_at: env.clock.now(),
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Registration(event), env));
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    user_id.to_string(),
                    "payment.declined",
                    json!({
                        "registration_id": registration_id.to_string(),
                        "reason": reason,
                    })
                )
            });
        },

        // The confirmation already landed; a late gateway verdict is a
        // no-op either way.
        (RegistrationStatus::Confirmed, _) => {
            tracing::debug!(%registration_id, "payment result for already-confirmed registration ignored");
        },

        (RegistrationStatus::Cancelled, _) => {
            if registration.cancelled_reason == Some(CancellationReason::Expired) {
                reject(state, RegistrationError::ExpiredRegistration);
            } else {
                reject(
                    state,
                    RegistrationError::InvalidTransition {
                        from: RegistrationStatus::Cancelled,
                        attempted: "record a payment result".to_string(),
                    },
                );
            }
        },

        (from @ (RegistrationStatus::Transferred | RegistrationStatus::Waitlisted), _) => {
            reject(
                state,
                RegistrationError::InvalidTransition {
                    from,
                    attempted: "record a payment result".to_string(),
                },
            );
        },
    }

    effects
}

fn cancel(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    reason: CancellationReason,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };

    match registration.status {
        RegistrationStatus::Waitlisted => {
            // Cancelling a waitlisted registration is leaving the queue.
            let user_id = registration.user_id;
            waitlist::leave(state, env, user_id, &mut effects);
        },

        RegistrationStatus::Pending | RegistrationStatus::Confirmed => {
            let now = env.clock.now();
            if registration.status == RegistrationStatus::Confirmed && now >= state.event.starts_at
            {
                reject(
                    state,
                    RegistrationError::InvalidTransition {
                        from: RegistrationStatus::Confirmed,
                        attempted: "cancel after the event start".to_string(),
                    },
                );
                return effects;
            }

            let user_id = registration.user_id;
            let refunded = registration.payment_status == PaymentStatus::Approved
                && registration.method != PaymentMethod::Exempt;

            let event = RegistrationAction::RegistrationCancelled {
                registration_id,
                reason,
                refunded,
                cancelled_at: now,
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Registration(event), env));
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    user_id.to_string(),
                    "registration.cancelled",
                    json!({
                        "registration_id": registration_id.to_string(),
                        "refunded": refunded,
                    })
                )
            });

            // A notified waitlist user cancelling their offer loses the
            // entry too.
            if let Some(entry) = state.entry_for_registration(&registration_id) {
                if entry.status == WaitlistStatus::Notified {
                    let entry_id = entry.id;
                    let expired = WaitlistAction::WaitlistEntryExpired {
                        entry_id,
                        expired_at: now,
                    };
                    waitlist::apply(state, &expired);
                    effects.push(persist(RegistryEvent::Waitlist(expired), env));
                }
            }

            // The freed slot goes to the waitlist head, inside this same
            // critical section.
            waitlist::promote_ready(state, env, &mut effects);
        },

        // Already cancelled: the end state is what the caller asked for.
        RegistrationStatus::Cancelled => {
            tracing::debug!(%registration_id, "cancel of already-cancelled registration ignored");
        },

        RegistrationStatus::Transferred => {
            reject(
                state,
                RegistrationError::InvalidTransition {
                    from: RegistrationStatus::Transferred,
                    attempted: "cancel".to_string(),
                },
            );
        },
    }

    effects
}

fn check_in(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    // Reads reconcile lazily: an expired pending registration must not
    // walk through the door.
    let mut sweep_effects = sweep_due(state, env);
    effects.append(&mut sweep_effects);

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };

    if registration.status != RegistrationStatus::Confirmed {
        let from = registration.status;
        if from == RegistrationStatus::Cancelled
            && registration.cancelled_reason == Some(CancellationReason::Expired)
        {
            reject(state, RegistrationError::ExpiredRegistration);
        } else {
            reject(
                state,
                RegistrationError::InvalidTransition {
                    from,
                    attempted: "check in".to_string(),
                },
            );
        }
        return effects;
    }

    if registration.checked_in {
        reject(
            state,
            RegistrationError::InvalidTransition {
                from: RegistrationStatus::Confirmed,
                attempted: "check in twice".to_string(),
            },
        );
        return effects;
    }

    let user_id = registration.user_id;
    let event = RegistrationAction::CheckedIn {
        registration_id,
        checked_in_at: env.clock.now(),
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Registration(event), env));
    effects.push(notify! {
        sink: env.notifications,
        notice: Notice::new(
            user_id.to_string(),
            "registration.checked_in",
            json!({ "registration_id": registration_id.to_string() })
        )
    });

    effects
}

/// Reclaim every pending registration whose deadline has passed.
pub(crate) fn sweep_due(state: &mut RegistryState, env: &RegistryEnvironment) -> Effects {
    let mut effects = Effects::new();
    for registration_id in state.due_pending(env.clock.now()) {
        expire_if_due(state, env, registration_id, &mut effects);
    }
    effects
}

/// Expire one pending registration if its deadline passed. A no-op on
/// anything already confirmed, cancelled, or not yet due — sweeping twice
/// has the same effect as once.
fn expire_if_due(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    registration_id: RegistrationId,
    effects: &mut Effects,
) {
    let Some(registration) = state.registrations.get(&registration_id) else {
        return;
    };
    if registration.status != RegistrationStatus::Pending {
        return;
    }
    let now = env.clock.now();
    let Some(deadline) = registration.expires_at else {
        return;
    };
    if now <= deadline {
        return;
    }

    let user_id = registration.user_id;
    let event = RegistrationAction::RegistrationCancelled {
        registration_id,
        reason: CancellationReason::Expired,
        refunded: false,
        cancelled_at: now,
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Registration(event), env));
    effects.push(notify! {
        sink: env.notifications,
        notice: Notice::new(
            user_id.to_string(),
            "registration.expired",
            json!({ "registration_id": registration_id.to_string() })
        )
    });

    // A notified waitlist user who let their offer lapse loses the entry.
    if let Some(entry) = state.entry_for_registration(&registration_id) {
        if entry.status == WaitlistStatus::Notified {
            let entry_id = entry.id;
            let expired = WaitlistAction::WaitlistEntryExpired {
                entry_id,
                expired_at: now,
            };
            waitlist::apply(state, &expired);
            effects.push(persist(RegistryEvent::Waitlist(expired), env));
        }
    }

    waitlist::promote_ready(state, env, effects);
}

/// Apply an event to state. Infallible; also the replay path.
pub(crate) fn apply(state: &mut RegistryState, event: &RegistrationAction) {
    match event {
        RegistrationAction::RegistrationCreated { registration } => {
            state
                .active_by_user
                .insert(registration.user_id, registration.id);
            if registration.holds_slot() {
                state.ledger.try_reserve();
            }
            state
                .registrations
                .insert(registration.id, registration.clone());
        },

        RegistrationAction::PaymentSessionOpened {
            registration_id,
            session,
        } => {
            if let Some(registration) = state.registrations.get_mut(registration_id) {
                if registration.status == RegistrationStatus::Pending {
                    registration.payment_session = Some(session.clone());
                }
            }
        },

        RegistrationAction::PaymentAuthorizationFailed {
            registration_id,
            error,
        } => {
            tracing::warn!(%registration_id, %error, "payment authorization failed");
        },

        RegistrationAction::RegistrationConfirmed {
            registration_id, ..
        } => {
            if let Some(registration) = state.registrations.get_mut(registration_id) {
                registration.status = RegistrationStatus::Confirmed;
                registration.payment_status = PaymentStatus::Approved;
            }
        },

        RegistrationAction::PaymentDeclined {
            registration_id, ..
        } => {
            if let Some(registration) = state.registrations.get_mut(registration_id) {
                registration.payment_status = PaymentStatus::Rejected;
            }
        },

        RegistrationAction::RegistrationCancelled {
            registration_id,
            reason,
            refunded,
            cancelled_at,
        } => {
            let released = if let Some(registration) = state.registrations.get_mut(registration_id)
            {
                let held = registration.holds_slot();
                registration.status = RegistrationStatus::Cancelled;
                registration.cancelled_reason = Some(*reason);
                if *refunded {
                    registration.payment_status = PaymentStatus::Refunded;
                }
                held.then_some(registration.user_id)
            } else {
                None
            };

            if let Some(user_id) = released {
                state.ledger.release();
                state.note_release(*cancelled_at);
                state.active_by_user.remove(&user_id);
            }
        },

        RegistrationAction::CheckedIn {
            registration_id,
            checked_in_at,
        } => {
            if let Some(registration) = state.registrations.get_mut(registration_id) {
                registration.checked_in = true;
                registration.checked_in_at = Some(*checked_in_at);
            }
        },

        // Commands don't modify state.
        RegistrationAction::Register { .. }
        | RegistrationAction::RecordPaymentResult { .. }
        | RegistrationAction::RecordPaymentSession { .. }
        | RegistrationAction::RecordAuthorizationFailure { .. }
        | RegistrationAction::Cancel { .. }
        | RegistrationAction::CheckIn { .. }
        | RegistrationAction::Expire { .. }
        | RegistrationAction::SweepDue => {},
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::RegistryReducer;
    use crate::aggregates::test_support::{
        env_with_clock, published_event, register, stepping_clock, test_env,
    };
    use crate::types::{Money, RegistryState};
    use chrono::Duration;
    use turnstile_core::reducer::Reducer;
    use turnstile_testing::{ReducerTest, assertions};

    #[test]
    fn exempt_registration_confirms_immediately() {
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        // 80-cent deposit, 25% discount: 60 cents, below the minimum
        // payable amount.
        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(3, 80)))
            .when_action(register(registration_id, user_id, "Ana Souza", 90))
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert_eq!(registration.status, RegistrationStatus::Confirmed);
                assert_eq!(registration.payment_status, PaymentStatus::Approved);
                assert_eq!(registration.method, PaymentMethod::Exempt);
                assert!(registration.expires_at.is_none());
                assert_eq!(state.ledger.available(), 2);
                assert!(state.last_rejection.is_none());
            })
            .then_effects(|effects| {
                // Persist + notify; no deadline, no gateway session.
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_append_effect(effects);
                assertions::assert_has_notify_effect(effects);
            })
            .run();
    }

    #[test]
    fn priced_registration_goes_pending_with_a_deadline() {
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(3, 10_000)))
            .when_action(register(registration_id, user_id, "Ana Souza", 0))
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert_eq!(registration.status, RegistrationStatus::Pending);
                assert_eq!(registration.payment_status, PaymentStatus::Pending);
                assert_eq!(registration.final_price, Money::from_cents(10_000));
                assert!(registration.expires_at.is_some());
                // Pending provisionally holds the slot.
                assert_eq!(state.ledger.available(), 2);
            })
            .then_effects(|effects| {
                // Persist + notify + deadline + gateway session.
                assertions::assert_effects_count(effects, 4);
                assertions::assert_has_delay_effect(effects);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn duplicate_registration_is_rejected_without_ledger_mutation() {
        let user_id = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(3, 80)))
            .when_action(register(RegistrationId::new(), user_id, "Ana Souza", 90))
            .when_action(register(RegistrationId::new(), user_id, "Ana Souza", 90))
            .then_state(move |state| {
                assert_eq!(
                    state.last_rejection,
                    Some(RegistrationError::AlreadyRegistered)
                );
                assert_eq!(state.ledger.available(), 2);
                assert_eq!(state.registrations.len(), 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn registration_on_a_full_event_routes_to_the_waitlist() {
        let first = UserId::new();
        let second = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(1, 80)))
            .when_action(register(RegistrationId::new(), first, "Ana Souza", 90))
            .when_action(register(RegistrationId::new(), second, "Bruno Lima", 90))
            .then_state(move |state| {
                assert!(state.last_rejection.is_none());
                let shadow = state.active_registration_of(&second).unwrap();
                assert_eq!(shadow.status, RegistrationStatus::Waitlisted);
                assert_eq!(state.position_of(&second), Some(1));
                assert_eq!(state.ledger.available(), 0);
            })
            .then_effects(|effects| {
                assertions::assert_has_append_effect(effects);
                assertions::assert_has_notify_effect(effects);
            })
            .run();
    }

    #[test]
    fn draft_event_rejects_registration() {
        let mut event = published_event(3, 80);
        event.status = EventStatus::Draft;

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(event))
            .when_action(register(RegistrationId::new(), UserId::new(), "Ana Souza", 90))
            .then_state(|state| {
                assert_eq!(
                    state.last_rejection,
                    Some(RegistrationError::RegistrationClosed)
                );
                assert!(state.registrations.is_empty());
            })
            .run();
    }

    #[test]
    fn approved_payment_confirms_a_pending_registration() {
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(3, 10_000)))
            .when_action(register(registration_id, user_id, "Ana Souza", 0))
            .when_action(
                RegistrationAction::RecordPaymentResult {
                    registration_id,
                    result: PaymentResult::Approved,
                }
                .into(),
            )
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert_eq!(registration.status, RegistrationStatus::Confirmed);
                assert_eq!(registration.payment_status, PaymentStatus::Approved);
            })
            .then_effects(|effects| {
                assertions::assert_has_append_effect(effects);
                assertions::assert_has_notify_effect(effects);
            })
            .run();
    }

    #[test]
    fn declined_payment_keeps_the_slot_until_the_deadline() {
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(3, 10_000)))
            .when_action(register(registration_id, user_id, "Ana Souza", 0))
            .when_action(
                RegistrationAction::RecordPaymentResult {
                    registration_id,
                    result: PaymentResult::Declined {
                        reason: "insufficient funds".to_string(),
                    },
                }
                .into(),
            )
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert_eq!(registration.status, RegistrationStatus::Pending);
                assert_eq!(registration.payment_status, PaymentStatus::Rejected);
                assert_eq!(state.ledger.available(), 2);
            })
            .run();
    }

    #[test]
    fn sweep_expires_overdue_pending_registrations() {
        let clock = stepping_clock();
        let env = env_with_clock(clock.clone());
        let reducer = RegistryReducer::new();
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        let mut state = RegistryState::new(published_event(1, 10_000));
        reducer.reduce(
            &mut state,
            register(registration_id, user_id, "Ana Souza", 0),
            &env,
        );
        assert_eq!(state.ledger.available(), 0);

        // One minute past the 15-minute payment deadline.
        clock.advance(Duration::minutes(16));
        reducer.reduce(&mut state, RegistrationAction::SweepDue.into(), &env);

        let registration = state.registration(&registration_id).unwrap();
        assert_eq!(registration.status, RegistrationStatus::Cancelled);
        assert_eq!(
            registration.cancelled_reason,
            Some(CancellationReason::Expired)
        );
        assert_eq!(state.ledger.available(), 1);
        assert!(state.active_registration_of(&user_id).is_none());

        // Sweeping twice has the same effect as once.
        let effects = reducer.reduce(&mut state, RegistrationAction::SweepDue.into(), &env);
        assert!(effects.is_empty());
        assert_eq!(state.ledger.available(), 1);
    }

    #[test]
    fn confirmation_after_expiry_surfaces_expired_registration() {
        let clock = stepping_clock();
        let env = env_with_clock(clock.clone());
        let reducer = RegistryReducer::new();
        let registration_id = RegistrationId::new();

        let mut state = RegistryState::new(published_event(1, 10_000));
        reducer.reduce(
            &mut state,
            register(registration_id, UserId::new(), "Ana Souza", 0),
            &env,
        );
        clock.advance(Duration::minutes(16));
        reducer.reduce(&mut state, RegistrationAction::SweepDue.into(), &env);

        reducer.reduce(
            &mut state,
            RegistrationAction::RecordPaymentResult {
                registration_id,
                result: PaymentResult::Approved,
            }
            .into(),
            &env,
        );
        assert_eq!(
            state.last_rejection,
            Some(RegistrationError::ExpiredRegistration)
        );
    }

    #[test]
    fn expiry_of_a_confirmed_registration_is_a_no_op() {
        let clock = stepping_clock();
        let env = env_with_clock(clock.clone());
        let reducer = RegistryReducer::new();
        let registration_id = RegistrationId::new();

        let mut state = RegistryState::new(published_event(1, 10_000));
        reducer.reduce(
            &mut state,
            register(registration_id, UserId::new(), "Ana Souza", 0),
            &env,
        );
        reducer.reduce(
            &mut state,
            RegistrationAction::RecordPaymentResult {
                registration_id,
                result: PaymentResult::Approved,
            }
            .into(),
            &env,
        );

        // The deadline passes, but the confirmation landed first.
        clock.advance(Duration::minutes(16));
        let effects = reducer.reduce(
            &mut state,
            RegistrationAction::Expire { registration_id }.into(),
            &env,
        );

        assert!(effects.is_empty());
        let registration = state.registration(&registration_id).unwrap();
        assert_eq!(registration.status, RegistrationStatus::Confirmed);
        assert_eq!(state.ledger.available(), 0);
    }

    #[test]
    fn cancelling_a_confirmed_registration_releases_and_refunds() {
        let registration_id = RegistrationId::new();
        let user_id = UserId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(2, 10_000)))
            .when_action(register(registration_id, user_id, "Ana Souza", 0))
            .when_action(
                RegistrationAction::RecordPaymentResult {
                    registration_id,
                    result: PaymentResult::Approved,
                }
                .into(),
            )
            .when_action(
                RegistrationAction::Cancel {
                    registration_id,
                    reason: CancellationReason::Attendee,
                }
                .into(),
            )
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert_eq!(registration.status, RegistrationStatus::Cancelled);
                assert_eq!(registration.payment_status, PaymentStatus::Refunded);
                assert_eq!(state.ledger.available(), 2);
                assert!(state.active_registration_of(&user_id).is_none());
            })
            .run();
    }

    #[test]
    fn cancelling_twice_is_a_no_op() {
        let registration_id = RegistrationId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(2, 80)))
            .when_action(register(registration_id, UserId::new(), "Ana Souza", 90))
            .when_action(
                RegistrationAction::Cancel {
                    registration_id,
                    reason: CancellationReason::Attendee,
                }
                .into(),
            )
            .when_action(
                RegistrationAction::Cancel {
                    registration_id,
                    reason: CancellationReason::Attendee,
                }
                .into(),
            )
            .then_state(move |state| {
                assert!(state.last_rejection.is_none());
                assert_eq!(state.ledger.available(), 2);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn check_in_requires_a_confirmed_registration() {
        let registration_id = RegistrationId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(2, 10_000)))
            .when_action(register(registration_id, UserId::new(), "Ana Souza", 0))
            .when_action(RegistrationAction::CheckIn { registration_id }.into())
            .then_state(|state| {
                assert!(matches!(
                    state.last_rejection,
                    Some(RegistrationError::InvalidTransition {
                        from: RegistrationStatus::Pending,
                        ..
                    })
                ));
            })
            .run();
    }

    #[test]
    fn check_in_marks_the_registration_once() {
        let registration_id = RegistrationId::new();

        ReducerTest::new(RegistryReducer::new())
            .with_env(test_env())
            .given_state(RegistryState::new(published_event(2, 80)))
            .when_action(register(registration_id, UserId::new(), "Ana Souza", 90))
            .when_action(RegistrationAction::CheckIn { registration_id }.into())
            .when_action(RegistrationAction::CheckIn { registration_id }.into())
            .then_state(move |state| {
                let registration = state.registration(&registration_id).unwrap();
                assert!(registration.checked_in);
                assert!(registration.checked_in_at.is_some());
                // The second attempt is refused.
                assert!(matches!(
                    state.last_rejection,
                    Some(RegistrationError::InvalidTransition { .. })
                ));
            })
            .run();
    }
}
