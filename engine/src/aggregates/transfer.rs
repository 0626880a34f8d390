//! Transfer workflow — reassigning a confirmed registration's ownership.
//!
//! The holder offers; the recipient (or an administrator) resolves. An
//! accepted transfer never touches the capacity ledger: the slot stays
//! occupied, just by a different user. The original registration becomes
//! `Transferred` (terminal, kept for audit) and the recipient receives a
//! fresh confirmed registration carrying their own identity snapshot and a
//! new ticket code.

use super::{Effects, RegistryEnvironment, persist, reject};
use crate::error::RegistrationError;
use crate::events::RegistryEvent;
use crate::types::{
    Actor, Registration, RegistrationId, RegistrationStatus, RegistryState, TicketCode,
    TransferDecision, TransferRequest, TransferRequestId, TransferStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smallvec::SmallVec;
use turnstile_core::notify;
use turnstile_core::notify::Notice;
use turnstile_macros::Action;

/// Actions for the transfer workflow.
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum TransferAction {
    // Commands
    /// Offer a confirmed registration to another user.
    #[command]
    Create {
        /// Identity for the new request.
        request_id: TransferRequestId,
        /// The registration changing hands.
        registration_id: RegistrationId,
        /// Current holder.
        from_user: UserId,
        /// Intended recipient.
        to_user: UserId,
        /// Optional message from the holder.
        message: Option<String>,
    },

    /// Resolve a sent request.
    #[command]
    Resolve {
        /// The request being resolved.
        request_id: TransferRequestId,
        /// Accept, deny, or cancel.
        decision: TransferDecision,
        /// Who is resolving.
        resolved_by: Actor,
    },

    // Events
    /// A transfer request was sent to the recipient.
    #[event]
    TransferRequested {
        /// The new request.
        request: TransferRequest,
    },

    /// The recipient accepted; ownership moved.
    #[event]
    TransferAccepted {
        /// The accepted request.
        request_id: TransferRequestId,
        /// The recipient's replacement registration.
        replacement: Registration,
        /// When.
        accepted_at: DateTime<Utc>,
    },

    /// The recipient declined; the registration stays with the holder.
    #[event]
    TransferDenied {
        /// The denied request.
        request_id: TransferRequestId,
        /// When.
        denied_at: DateTime<Utc>,
    },

    /// The holder withdrew the request.
    #[event]
    TransferCancelled {
        /// The withdrawn request.
        request_id: TransferRequestId,
        /// When.
        cancelled_at: DateTime<Utc>,
    },
}

pub(crate) fn handle(
    state: &mut RegistryState,
    action: TransferAction,
    env: &RegistryEnvironment,
) -> Effects {
    match action {
        TransferAction::Create {
            request_id,
            registration_id,
            from_user,
            to_user,
            message,
        } => create(state, env, request_id, registration_id, from_user, to_user, message),
        TransferAction::Resolve {
            request_id,
            decision,
            resolved_by,
        } => resolve(state, env, request_id, decision, resolved_by),
        // Events (from the store's feedback loop or stream replay)
        event => {
            apply(state, &event);
            SmallVec::new()
        },
    }
}

fn create(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    request_id: TransferRequestId,
    registration_id: RegistrationId,
    from_user: UserId,
    to_user: UserId,
    message: Option<String>,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(registration) = state.registrations.get(&registration_id) else {
        reject(state, RegistrationError::UnknownRegistration);
        return effects;
    };
    let status = registration.status;
    let holder = registration.user_id;

    let refusal = if !state.event.transfer_allowed {
        Some("this event does not allow transfers")
    } else if status != RegistrationStatus::Confirmed {
        Some("only confirmed registrations can be transferred")
    } else if holder != from_user {
        Some("only the holder may offer a transfer")
    } else if to_user == from_user {
        Some("cannot transfer a registration to its holder")
    } else if state.event.starts_at - env.clock.now() <= env.policy.transfer_lead {
        Some("too close to the event start")
    } else if state.open_transfer_for(&registration_id).is_some() {
        Some("a transfer request for this registration is already pending")
    } else {
        None
    };

    if let Some(reason) = refusal {
        reject(state, RegistrationError::TransferNotAllowed(reason.to_string()));
        return effects;
    }

    let request = TransferRequest {
        id: request_id,
        registration_id,
        from_user,
        to_user,
        status: TransferStatus::Sent,
        message,
        created_at: env.clock.now(),
    };

    let event = TransferAction::TransferRequested {
        request: request.clone(),
    };
    apply(state, &event);
    effects.push(persist(RegistryEvent::Transfer(event), env));
    effects.push(notify! {
        sink: env.notifications,
        notice: Notice::new(
            to_user.to_string(),
            "transfer.received",
            json!({
                "request_id": request_id.to_string(),
                "from_user": from_user.to_string(),
                "message": request.message,
            })
        )
    });

    effects
}

fn resolve(
    state: &mut RegistryState,
    env: &RegistryEnvironment,
    request_id: TransferRequestId,
    decision: TransferDecision,
    resolved_by: Actor,
) -> Effects {
    state.last_rejection = None;
    let mut effects = Effects::new();

    let Some(request) = state.transfers.get(&request_id) else {
        reject(state, RegistrationError::UnknownTransfer);
        return effects;
    };

    if request.status != TransferStatus::Sent {
        reject(
            state,
            RegistrationError::TransferNotAllowed("request is already resolved".to_string()),
        );
        return effects;
    }

    let registration_id = request.registration_id;
    let from_user = request.from_user;
    let to_user = request.to_user;

    match decision {
        TransferDecision::Accept {
            recipient,
            replacement_id,
        } => {
            if resolved_by.user_id != to_user && !resolved_by.admin {
                reject(
                    state,
                    RegistrationError::TransferNotAllowed(
                        "only the recipient may accept".to_string(),
                    ),
                );
                return effects;
            }

            let Some(original) = state.registrations.get(&registration_id) else {
                reject(state, RegistrationError::UnknownRegistration);
                return effects;
            };
            if original.status != RegistrationStatus::Confirmed {
                reject(
                    state,
                    RegistrationError::TransferNotAllowed(
                        "registration is no longer confirmed".to_string(),
                    ),
                );
                return effects;
            }
            if state.active_by_user.contains_key(&to_user) {
                reject(state, RegistrationError::AlreadyRegistered);
                return effects;
            }

            let now = env.clock.now();
            let replacement = Registration {
                id: replacement_id,
                event_id: original.event_id,
                user_id: to_user,
                attendee: recipient,
                status: RegistrationStatus::Confirmed,
                payment_status: original.payment_status,
                method: original.method,
                original_price: original.original_price,
                discount: original.discount,
                final_price: original.final_price,
                expires_at: None,
                payment_session: None,
                checked_in: false,
                checked_in_at: None,
                cancelled_reason: None,
                ticket_code: TicketCode::new(),
                created_at: now,
            };

            let event = TransferAction::TransferAccepted {
                request_id,
                replacement: replacement.clone(),
                accepted_at: now,
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Transfer(event), env));
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    from_user.to_string(),
                    "transfer.accepted",
                    json!({ "request_id": request_id.to_string() })
                )
            });
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    to_user.to_string(),
                    "registration.confirmed",
                    json!({
                        "registration_id": replacement.id.to_string(),
                        "ticket_code": replacement.ticket_code.to_string(),
                    })
                )
            });
        },

        TransferDecision::Deny => {
            if resolved_by.user_id != to_user && !resolved_by.admin {
                reject(
                    state,
                    RegistrationError::TransferNotAllowed(
                        "only the recipient may deny".to_string(),
                    ),
                );
                return effects;
            }

            let event = TransferAction::TransferDenied {
                request_id,
                denied_at: env.clock.now(),
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Transfer(event), env));
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    from_user.to_string(),
                    "transfer.denied",
                    json!({ "request_id": request_id.to_string() })
                )
            });
        },

        TransferDecision::Cancel => {
            if resolved_by.user_id != from_user && !resolved_by.admin {
                reject(
                    state,
                    RegistrationError::TransferNotAllowed(
                        "only the sender may cancel".to_string(),
                    ),
                );
                return effects;
            }

            let event = TransferAction::TransferCancelled {
                request_id,
                cancelled_at: env.clock.now(),
            };
            apply(state, &event);
            effects.push(persist(RegistryEvent::Transfer(event), env));
            effects.push(notify! {
                sink: env.notifications,
                notice: Notice::new(
                    to_user.to_string(),
                    "transfer.cancelled",
                    json!({ "request_id": request_id.to_string() })
                )
            });
        },
    }

    effects
}

/// Apply an event to state. Infallible; also the replay path.
pub(crate) fn apply(state: &mut RegistryState, event: &TransferAction) {
    match event {
        TransferAction::TransferRequested { request } => {
            state.transfers.insert(request.id, request.clone());
        },

        TransferAction::TransferAccepted {
            request_id,
            replacement,
            ..
        } => {
            let original = if let Some(request) = state.transfers.get_mut(request_id) {
                request.status = TransferStatus::Accepted;
                Some(request.registration_id)
            } else {
                None
            };

            if let Some(original_id) = original {
                if let Some(registration) = state.registrations.get_mut(&original_id) {
                    registration.status = RegistrationStatus::Transferred;
                    state.active_by_user.remove(&registration.user_id);
                }
            }

            // The slot stays occupied; the ledger is untouched.
            state
                .active_by_user
                .insert(replacement.user_id, replacement.id);
            state
                .registrations
                .insert(replacement.id, replacement.clone());
        },

        TransferAction::TransferDenied { request_id, .. } => {
            if let Some(request) = state.transfers.get_mut(request_id) {
                request.status = TransferStatus::Denied;
            }
        },

        TransferAction::TransferCancelled { request_id, .. } => {
            if let Some(request) = state.transfers.get_mut(request_id) {
                request.status = TransferStatus::Cancelled;
            }
        },

        // Commands don't modify state.
        TransferAction::Create { .. } | TransferAction::Resolve { .. } => {},
    }
}
