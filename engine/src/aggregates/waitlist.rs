//! Waitlist queue — strict FIFO by enqueue time.
//!
//! Users wanting a slot for a full event queue here. Each queued user gets
//! a shadow registration (status `Waitlisted`) for bookkeeping; it holds no
//! capacity and moves in lockstep with its entry. Promotion runs inside the
//! same reduce call that released the slot: the head entry takes the slot
//! as a pending registration with a fresh payment deadline (or confirms
//! outright when the price is exempt). A reservation race leaves the entry
//! at the head of the queue — entries are never silently dropped.

use super::{Effects, RegistryEnvironment, persist, registration, reject};
use crate::error::RegistrationError;
use crate::events::RegistryEvent;
use crate::types::{
    AttendeeSnapshot, CancellationReason, PaymentMethod, PaymentStatus, Registration,
    RegistrationId, RegistrationStatus, RegistryState, ReputationScore, TicketCode, UserId,
    WaitlistEntry, WaitlistEntryId, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smallvec::SmallVec;
use turnstile_core::notify;
use turnstile_core::notify::Notice;
use turnstile_macros::Action;

/// Actions for the waitlist queue.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum WaitlistAction {
    // Commands
    /// Join the queue of a full event.
    #[command]
    Join {
        /// The queuing user.
        user_id: UserId,
        /// Identity snapshot captured by the caller.
        attendee: AttendeeSnapshot,
        /// Reputation score feeding the pricing policy.
        reputation: ReputationScore,
        /// Payment method to use if a slot is offered.
        method: PaymentMethod,
    },

    /// Leave the queue.
    #[command]
    Leave {
        /// The leaving user.
        user_id: UserId,
    },

    /// Promote queued entries into freed slots. Runs automatically after
    /// every release; exposed as a command for operational nudges.
    #[command]
    PromoteNext,

    // Events
    /// A user joined the queue.
    #[event]
    WaitlistJoined {
        /// The new entry.
        entry: WaitlistEntry,
        /// Its shadow registration (holds no capacity).
        shadow: Registration,
    },

    /// A user left the queue.
    #[event]
    WaitlistLeft {
        /// The abandoned entry.
        entry_id: WaitlistEntryId,
        /// When.
        left_at: DateTime<Utc>,
    },

    /// The head of the queue was offered a freed slot. With a deadline the
    /// shadow registration went pending; without one it confirmed outright.
    #[event]
    WaitlistPromoted {
        /// The promoted entry.
        entry_id: WaitlistEntryId,
        /// Its shadow registration, now holding the slot.
        registration_id: RegistrationId,
        /// Payment deadline of the offer; `None` when exempt.
        expires_at: Option<DateTime<Utc>>,
        /// When the slot was offered.
        promoted_at: DateTime<Utc>,
    },

    /// A notified user took their offered slot.
    #[event]
    WaitlistEntryAccepted {
        /// The accepted entry.
        entry_id: WaitlistEntryId,
        /// When.
        accepted_at: DateTime<Utc>,
    },

    /// A notified user let their offer lapse.
    #[event]
    WaitlistEntryExpired {
        /// The lapsed entry.
        entry_id: WaitlistEntryId,
        /// When.
        expired_at: DateTime<Utc>,
    },
}

pub(crate) fn handle(
    state: &mut RegistryState,
    action: WaitlistAction,
    env: &RegistryEnvironment,
) -> Effects {
    match action {
        WaitlistAction::Join {
            user_id,
            attendee,
            reputation,
            method,
        } => {
            state.last_rejection = None;
            // Reclaim due slots first: if that frees capacity, the join is
            // refused and the caller should register directly.
            let mut effects = registration::sweep_due(state, env);
            join(state, env, user_id, attendee, reputation, method, &mut effects);
            effects
        },
        WaitlistAction::Leave { user_id } => {
            state.last_rejection = None;
            let mut effects = Effects::new();
            leave(state, env, user_id, &mut effects);
            effects
        },
        WaitlistAction::PromoteNext => {
            state.last_rejection = None;
            let mut effects = Effects::new();
            promote_ready(state, env, &mut effects);
            effects
        },
        // Events (from the store's feedback loop or stream replay)
        event => {
            apply(state, &event);
            SmallVec::new()
        },
    }
}

/// Enqueue a user. Called by the `Join` command and by `Register` when the
/// event is full.
pub(crate) fn join(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    user_id: UserId,
    attendee: AttendeeSnapshot,
    reputation: ReputationScore,
    method: PaymentMethod,
    effects: &mut Effects,
) {
    if state.ledger.available() > 0 {
        reject(state, RegistrationError::CapacityAvailable);
        return;
    }
    if state.queued_by_user.contains_key(&user_id) {
        reject(state, RegistrationError::AlreadyQueued);
        return;
    }
    if state.active_by_user.contains_key(&user_id) {
        reject(state, RegistrationError::AlreadyRegistered);
        return;
    }

    let now = env.clock.now();
    let quote = env.policy.pricing.quote(state.event.deposit, reputation);

    let shadow = Registration {
        id: RegistrationId::new(),
        event_id: state.event.id,
        user_id,
        attendee,
        status: RegistrationStatus::Waitlisted,
        payment_status: PaymentStatus::Pending,
        method,
        original_price: quote.original,
        discount: quote.discount,
        final_price: quote.final_price,
        expires_at: None,
        payment_session: None,
        checked_in: false,
        checked_in_at: None,
        cancelled_reason: None,
        ticket_code: TicketCode::new(),
        created_at: now,
    };

    let entry = WaitlistEntry {
        id: WaitlistEntryId::new(),
        event_id: state.event.id,
        user_id,
        registration_id: shadow.id,
        status: WaitlistStatus::Queued,
        enqueued_at: now,
        notified_at: None,
        expires_at: None,
    };

    let event = WaitlistAction::WaitlistJoined {
        entry: entry.clone(),
        shadow,
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Waitlist(event), env));

    let position = state.position_of(&user_id).unwrap_or(state.queue.len());
    effects.push(notify! {
        sink: env.notifications,
        notice: Notice::new(
            user_id.to_string(),
            "waitlist.joined",
            json!({ "position": position })
        )
    });
}

/// Dequeue a user. Only `Queued` entries can leave; a notified user holds a
/// pending registration and cancels that instead.
pub(crate) fn leave(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    user_id: UserId,
    effects: &mut Effects,
) {
    let Some(&entry_id) = state.queued_by_user.get(&user_id) else {
        reject(state, RegistrationError::NotWaitlisted);
        return;
    };

    let event = WaitlistAction::WaitlistLeft {
        entry_id,
        left_at: env.clock.now(),
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Waitlist(event), env));
    effects.push(notify! {
        sink: env.notifications,
        notice: Notice::new(user_id.to_string(), "waitlist.left", json!({}))
    });
}

/// Promote the earliest queued entries into whatever capacity is free.
///
/// Invoked whenever the ledger frees a slot, inside the same critical
/// section as the release. A `try_reserve` failure (no capacity after all)
/// leaves the head entry queued for the next release.
pub(crate) fn promote_ready(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    effects: &mut Effects,
) {
    loop {
        if state.ledger.available() == 0 {
            return;
        }

        let Some(entry_id) = next_queued(state) else {
            return;
        };

        let Some(entry) = state.waitlist.get(&entry_id) else {
            return;
        };
        let registration_id = entry.registration_id;
        let user_id = entry.user_id;

        let Some(shadow) = state.registrations.get(&registration_id) else {
            // Orphaned entry; drop it and keep promoting.
            state.queue.retain(|id| *id != entry_id);
            state.queued_by_user.remove(&user_id);
            continue;
        };

        let exempt = env.policy.pricing.exempts(shadow.final_price);
        let now = env.clock.now();
        let expires_at = (!exempt).then(|| now + env.policy.payment_deadline);

        let event = WaitlistAction::WaitlistPromoted {
            entry_id,
            registration_id,
            expires_at,
            promoted_at: now,
        };
        apply(state, &event);
        effects.push(persist(RegistryEvent::Waitlist(event), env));

        if exempt {
            let ticket_code = state
                .registrations
                .get(&registration_id)
                .map(|r| r.ticket_code.to_string())
                .unwrap_or_default();
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    user_id.to_string(),
                    "registration.confirmed",
                    json!({
                        "registration_id": registration_id.to_string(),
                        "ticket_code": ticket_code,
                    })
                )
            });
        } else {
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    user_id.to_string(),
                    "waitlist.slot_offered",
                    json!({
                        "registration_id": registration_id.to_string(),
                        "expires_at": expires_at,
                    })
                )
            });
            if let Some(promoted) = state.registrations.get(&registration_id) {
                registration::push_payment_effects(env, promoted.clone(), effects);
            }
        }
    }
}

/// The queue head that is still genuinely queued, discarding stale ids.
fn next_queued(state: &mut RegistryState) -> Option<WaitlistEntryId> {
    while let Some(&front) = state.queue.front() {
        let still_queued = state
            .waitlist
            .get(&front)
            .is_some_and(|entry| entry.status == WaitlistStatus::Queued);
        if still_queued {
            return Some(front);
        }
        state.queue.pop_front();
    }
    None
}

/// Apply an event to state. Infallible; also the replay path.
pub(crate) fn apply(state: &mut RegistryState, event: &WaitlistAction) {
    match event {
        WaitlistAction::WaitlistJoined { entry, shadow } => {
            state.queue.push_back(entry.id);
            state.queued_by_user.insert(entry.user_id, entry.id);
            state.waitlist.insert(entry.id, entry.clone());
            state.active_by_user.insert(shadow.user_id, shadow.id);
            state.registrations.insert(shadow.id, shadow.clone());
        },

        WaitlistAction::WaitlistLeft { entry_id, .. } => {
            let dequeued = if let Some(entry) = state.waitlist.get_mut(entry_id) {
                entry.status = WaitlistStatus::Expired;
                Some((entry.user_id, entry.registration_id))
            } else {
                None
            };

            if let Some((user_id, registration_id)) = dequeued {
                state.queue.retain(|id| id != entry_id);
                state.queued_by_user.remove(&user_id);
                state.active_by_user.remove(&user_id);
                if let Some(shadow) = state.registrations.get_mut(&registration_id) {
                    shadow.status = RegistrationStatus::Cancelled;
                    shadow.cancelled_reason = Some(CancellationReason::Attendee);
                }
            }
        },

        WaitlistAction::WaitlistPromoted {
            entry_id,
            registration_id,
            expires_at,
            promoted_at,
        } => {
            let user_id = if let Some(entry) = state.waitlist.get_mut(entry_id) {
                entry.status = if expires_at.is_some() {
                    WaitlistStatus::Notified
                } else {
                    WaitlistStatus::Accepted
                };
                entry.notified_at = Some(*promoted_at);
                entry.expires_at = *expires_at;
                Some(entry.user_id)
            } else {
                None
            };

            if let Some(user_id) = user_id {
                state.queue.retain(|id| id != entry_id);
                state.queued_by_user.remove(&user_id);
            }

            if let Some(shadow) = state.registrations.get_mut(registration_id) {
                if expires_at.is_some() {
                    shadow.status = RegistrationStatus::Pending;
                    shadow.expires_at = *expires_at;
                } else {
                    shadow.status = RegistrationStatus::Confirmed;
                    shadow.payment_status = PaymentStatus::Approved;
                    shadow.method = PaymentMethod::Exempt;
                }
            }
            state.ledger.try_reserve();
        },

        WaitlistAction::WaitlistEntryAccepted { entry_id, .. } => {
            if let Some(entry) = state.waitlist.get_mut(entry_id) {
                entry.status = WaitlistStatus::Accepted;
            }
        },

        WaitlistAction::WaitlistEntryExpired { entry_id, .. } => {
            if let Some(entry) = state.waitlist.get_mut(entry_id) {
                entry.status = WaitlistStatus::Expired;
            }
        },

        // Commands don't modify state.
        WaitlistAction::Join { .. }
        | WaitlistAction::Leave { .. }
        | WaitlistAction::PromoteNext => {},
    }
}
