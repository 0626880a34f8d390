//! The event wire format of the registry aggregate.
//!
//! [`RegistryEvent`] wraps the event variants of the three action enums for
//! persistence. Only `#[event]` variants are ever wrapped — commands never
//! reach the stream.

use crate::aggregates::{RegistrationAction, RegistryAction, TransferAction, WaitlistAction};
use serde::{Deserialize, Serialize};
use turnstile_core::event::{DomainEvent, SerializedEvent};

/// A persisted registry event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Registration state machine events.
    Registration(RegistrationAction),
    /// Waitlist queue events.
    Waitlist(WaitlistAction),
    /// Transfer workflow events.
    Transfer(TransferAction),
}

impl RegistryEvent {
    /// Serialize for the event store.
    ///
    /// # Errors
    ///
    /// Returns the serialization error message when encoding fails.
    pub fn serialize(&self) -> Result<SerializedEvent, String> {
        SerializedEvent::from_event(self, None).map_err(|e| e.to_string())
    }
}

impl DomainEvent for RegistryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Registration(event) => event.event_type(),
            Self::Waitlist(event) => event.event_type(),
            Self::Transfer(event) => event.event_type(),
        }
    }
}

impl From<RegistryEvent> for RegistryAction {
    fn from(event: RegistryEvent) -> Self {
        match event {
            RegistryEvent::Registration(inner) => Self::Registration(inner),
            RegistryEvent::Waitlist(inner) => Self::Waitlist(inner),
            RegistryEvent::Transfer(inner) => Self::Transfer(inner),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::RegistrationId;
    use chrono::Utc;
    use turnstile_core::event::DomainEvent;

    #[test]
    fn event_type_delegates_to_the_variant() {
        let event = RegistryEvent::Registration(RegistrationAction::RegistrationConfirmed {
            registration_id: RegistrationId::new(),
            confirmed_at: Utc::now(),
        });
        assert_eq!(event.event_type(), "RegistrationConfirmed.v1");
    }

    #[test]
    fn roundtrips_through_bincode() {
        let registration_id = RegistrationId::new();
        let event = RegistryEvent::Registration(RegistrationAction::RegistrationConfirmed {
            registration_id,
            confirmed_at: Utc::now(),
        });

        let serialized = event.serialize().unwrap();
        assert_eq!(serialized.event_type, "RegistrationConfirmed.v1");

        let decoded = RegistryEvent::from_bytes(&serialized.data).unwrap();
        match decoded {
            RegistryEvent::Registration(RegistrationAction::RegistrationConfirmed {
                registration_id: decoded_id,
                ..
            }) => assert_eq!(decoded_id, registration_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
