//! Domain types for the registration and capacity lifecycle engine.
//!
//! Value objects, entities, and the per-event aggregate state. One
//! [`RegistryState`] holds the whole registration domain of a single
//! ticketed event: its capacity ledger, every registration ever made
//! (cancelled and expired ones are retained for audit), the FIFO waitlist,
//! and transfer requests.

use crate::error::RegistrationError;
use crate::ledger::CapacityLedger;
use crate::payment::PaymentSession;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

/// How far back the release log is kept for the slots-per-day estimate.
const RELEASE_WINDOW_DAYS: i64 = 7;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from a `Uuid`.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a ticketed event.
    EventId
);
uuid_id!(
    /// Unique identifier for a user.
    UserId
);
uuid_id!(
    /// Unique identifier for a registration.
    RegistrationId
);
uuid_id!(
    /// Unique identifier for a waitlist entry.
    WaitlistEntryId
);
uuid_id!(
    /// Unique identifier for a transfer request.
    TransferRequestId
);
uuid_id!(
    /// Opaque uniqueness token printed on the ticket and checked at the door.
    TicketCode
);

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `percent` of this amount, rounded down. Saturates on overflow.
    #[must_use]
    pub const fn percent(self, percent: u8) -> Self {
        Self(self.0.saturating_mul(percent as u64) / 100)
    }

    /// Subtraction floored at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Capacity and reputation value objects
// ============================================================================

/// Number of slots an event offers. Fixed after publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a capacity.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The number of slots.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's reputation score, stored in tenths for exact comparison
/// (a score of 8.5 is `from_tenths(85)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReputationScore(u16);

impl ReputationScore {
    /// Creates a score from tenths (85 = a score of 8.5).
    #[must_use]
    pub const fn from_tenths(tenths: u16) -> Self {
        Self(tenths)
    }

    /// The score in tenths.
    #[must_use]
    pub const fn tenths(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ReputationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

// ============================================================================
// Attendee snapshot
// ============================================================================

/// Identity snapshot captured at submission time.
///
/// An immutable copy, independent of later profile edits: the ticket shows
/// what the registrant looked like when they registered, and a transfer
/// swaps the whole snapshot for the recipient's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeSnapshot {
    /// Full name as it appears on the ticket.
    pub full_name: String,
    /// Identity document number (e.g. CPF).
    pub document: String,
    /// Contact phone.
    pub phone: String,
    /// Contact email.
    pub email: String,
}

// ============================================================================
// Event
// ============================================================================

/// Lifecycle status of a ticketed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Being drafted by the organizer; not open for registration.
    Draft,
    /// Open for registration.
    Published,
    /// The event has started.
    InProgress,
    /// The event is over.
    Finished,
    /// Cancelled by the organizer.
    Cancelled,
}

/// A ticketed event with finite capacity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Identity.
    pub id: EventId,
    /// Display title.
    pub title: String,
    /// Total slots. Fixed after publication.
    pub capacity: Capacity,
    /// Deposit price before discounts.
    pub deposit: Money,
    /// Whether confirmed registrations may be transferred.
    pub transfer_allowed: bool,
    /// Organizer's cancellation policy text.
    pub cancellation_policy: String,
    /// Lifecycle status.
    pub status: EventStatus,
    /// When the event starts.
    pub starts_at: DateTime<Utc>,
}

impl Event {
    /// Creates a draft event.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        capacity: Capacity,
        deposit: Money,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            capacity,
            deposit,
            transfer_allowed: true,
            cancellation_policy: String::new(),
            status: EventStatus::Draft,
            starts_at,
        }
    }

    /// Sets whether transfers are allowed.
    #[must_use]
    pub const fn allow_transfers(mut self, allowed: bool) -> Self {
        self.transfer_allowed = allowed;
        self
    }

    /// Sets the cancellation policy text.
    #[must_use]
    pub fn with_cancellation_policy(mut self, policy: impl Into<String>) -> Self {
        self.cancellation_policy = policy.into();
        self
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Lifecycle status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// Slot provisionally held, waiting for payment before the deadline.
    Pending,
    /// Slot held, payment settled (or exempt); check-in eligible.
    Confirmed,
    /// Terminal: cancelled by the attendee, the organizer, or expiry.
    Cancelled,
    /// Terminal: ownership moved to another user via a transfer.
    Transferred,
    /// Bookkeeping entry for a queued waitlist user; holds no slot.
    Waitlisted,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Transferred => "transferred",
            Self::Waitlisted => "waitlisted",
        };
        write!(f, "{label}")
    }
}

/// Payment status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// No capture yet.
    Pending,
    /// Captured (or exempt).
    Approved,
    /// Declined by the gateway; the holder may retry until the deadline.
    Rejected,
    /// Refunded after cancellation.
    Refunded,
}

/// How the registrant pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Card capture through the payment gateway.
    Card,
    /// Instant bank transfer through the payment gateway.
    Pix,
    /// Final price below the minimum payable amount; nothing to capture.
    Exempt,
}

/// Why a registration was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// The payment deadline passed.
    Expired,
    /// The attendee cancelled.
    Attendee,
    /// The organizer cancelled.
    Organizer,
}

/// One user's registration for one event.
///
/// Never physically deleted — cancelled and expired registrations are
/// retained for audit and capacity accounting history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registration {
    /// Identity.
    pub id: RegistrationId,
    /// The event this registration is for.
    pub event_id: EventId,
    /// The registrant.
    pub user_id: UserId,
    /// Identity snapshot captured at submission time.
    pub attendee: AttendeeSnapshot,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Payment method.
    pub method: PaymentMethod,
    /// Price before discount.
    pub original_price: Money,
    /// Discount applied.
    pub discount: Money,
    /// Price after discount, floored at zero.
    pub final_price: Money,
    /// Payment deadline while pending.
    pub expires_at: Option<DateTime<Utc>>,
    /// Gateway session opened for this registration, if any.
    pub payment_session: Option<PaymentSession>,
    /// Whether the attendee has checked in at the door.
    pub checked_in: bool,
    /// When the attendee checked in.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Why the registration was cancelled, if it was.
    pub cancelled_reason: Option<CancellationReason>,
    /// Opaque uniqueness token.
    pub ticket_code: TicketCode,
    /// When the registration was submitted.
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// Whether this registration occupies one of the event's slots.
    #[must_use]
    pub fn holds_slot(&self) -> bool {
        matches!(
            self.status,
            RegistrationStatus::Pending | RegistrationStatus::Confirmed
        )
    }

    /// Whether this registration blocks the user from registering again.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            RegistrationStatus::Pending
                | RegistrationStatus::Confirmed
                | RegistrationStatus::Waitlisted
        )
    }
}

// ============================================================================
// Waitlist
// ============================================================================

/// Lifecycle status of a waitlist entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitlistStatus {
    /// Waiting in line.
    Queued,
    /// A freed slot was offered; payment deadline running.
    Notified,
    /// The offered slot was taken (payment settled or exempt).
    Accepted,
    /// The entry was abandoned or the offer timed out.
    Expired,
}

/// One user's place in the FIFO queue for a full event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Identity.
    pub id: WaitlistEntryId,
    /// The event whose queue this entry is in.
    pub event_id: EventId,
    /// The queued user.
    pub user_id: UserId,
    /// The shadow registration created for bookkeeping.
    pub registration_id: RegistrationId,
    /// Lifecycle status.
    pub status: WaitlistStatus,
    /// Enqueue timestamp; defines FIFO order.
    pub enqueued_at: DateTime<Utc>,
    /// When a slot was offered.
    pub notified_at: Option<DateTime<Utc>>,
    /// Deadline of the offered slot.
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Transfer
// ============================================================================

/// Lifecycle status of a transfer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Waiting for the recipient.
    Sent,
    /// Accepted; ownership moved.
    Accepted,
    /// Declined by the recipient.
    Denied,
    /// Withdrawn by the holder.
    Cancelled,
}

/// A request to move a confirmed registration to another user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Identity.
    pub id: TransferRequestId,
    /// The registration changing hands.
    pub registration_id: RegistrationId,
    /// Current holder.
    pub from_user: UserId,
    /// Intended recipient.
    pub to_user: UserId,
    /// Lifecycle status.
    pub status: TransferStatus,
    /// Optional message from the holder.
    pub message: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

/// Who is acting on a transfer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// Administrator override.
    pub admin: bool,
}

impl Actor {
    /// A regular user acting on their own behalf.
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            admin: false,
        }
    }

    /// An administrator override.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            admin: true,
        }
    }
}

/// The recipient's (or holder's) verdict on a transfer request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TransferDecision {
    /// Accept: ownership moves to the recipient under a fresh registration.
    Accept {
        /// Identity snapshot of the recipient, captured at acceptance time.
        recipient: AttendeeSnapshot,
        /// Identity for the recipient's replacement registration.
        replacement_id: RegistrationId,
    },
    /// Decline; the registration stays with the holder.
    Deny,
    /// Withdrawn by the holder.
    Cancel,
}

// ============================================================================
// Aggregate state
// ============================================================================

/// The registration domain of one event.
///
/// All mutation flows through the registry reducer while the per-event
/// store holds its write lock, so reads through the same store observe a
/// consistent snapshot and "check capacity, then take the slot" is atomic.
#[derive(Clone, Debug)]
pub struct RegistryState {
    /// The event configuration (capacity fixed after publication).
    pub event: Event,
    /// Owned slot accounting; the single source of truth for availability.
    pub ledger: CapacityLedger,
    /// Every registration ever made, keyed by id.
    pub registrations: HashMap<RegistrationId, Registration>,
    /// Active (pending/confirmed/waitlisted) registration per user.
    pub active_by_user: HashMap<UserId, RegistrationId>,
    /// All waitlist entries, keyed by id.
    pub waitlist: HashMap<WaitlistEntryId, WaitlistEntry>,
    /// FIFO queue of currently queued entry ids.
    pub queue: VecDeque<WaitlistEntryId>,
    /// Queued entry per user.
    pub queued_by_user: HashMap<UserId, WaitlistEntryId>,
    /// Transfer requests, keyed by id.
    pub transfers: HashMap<TransferRequestId, TransferRequest>,
    /// Timestamps of recent slot releases, for the slots-per-day estimate.
    pub release_log: VecDeque<DateTime<Utc>>,
    /// Why the last command was rejected, if it was.
    pub last_rejection: Option<RegistrationError>,
}

impl RegistryState {
    /// Fresh state for a newly published event.
    #[must_use]
    pub fn new(event: Event) -> Self {
        let ledger = CapacityLedger::new(event.capacity);
        Self {
            event,
            ledger,
            registrations: HashMap::new(),
            active_by_user: HashMap::new(),
            waitlist: HashMap::new(),
            queue: VecDeque::new(),
            queued_by_user: HashMap::new(),
            transfers: HashMap::new(),
            release_log: VecDeque::new(),
            last_rejection: None,
        }
    }

    /// Look up a registration.
    #[must_use]
    pub fn registration(&self, id: &RegistrationId) -> Option<&Registration> {
        self.registrations.get(id)
    }

    /// The user's active registration, if any.
    #[must_use]
    pub fn active_registration_of(&self, user_id: &UserId) -> Option<&Registration> {
        self.active_by_user
            .get(user_id)
            .and_then(|id| self.registrations.get(id))
    }

    /// Look up a waitlist entry.
    #[must_use]
    pub fn entry(&self, id: &WaitlistEntryId) -> Option<&WaitlistEntry> {
        self.waitlist.get(id)
    }

    /// The waitlist entry backing a registration, if any.
    #[must_use]
    pub fn entry_for_registration(&self, id: &RegistrationId) -> Option<&WaitlistEntry> {
        self.waitlist
            .values()
            .find(|entry| entry.registration_id == *id)
    }

    /// 1-based position of a user in the queue, if queued.
    #[must_use]
    pub fn position_of(&self, user_id: &UserId) -> Option<usize> {
        let entry_id = self.queued_by_user.get(user_id)?;
        self.queue
            .iter()
            .position(|id| id == entry_id)
            .map(|index| index + 1)
    }

    /// Number of users currently queued.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Look up a transfer request.
    #[must_use]
    pub fn transfer(&self, id: &TransferRequestId) -> Option<&TransferRequest> {
        self.transfers.get(id)
    }

    /// The open (sent) transfer request for a registration, if any.
    #[must_use]
    pub fn open_transfer_for(&self, id: &RegistrationId) -> Option<&TransferRequest> {
        self.transfers
            .values()
            .find(|req| req.registration_id == *id && req.status == TransferStatus::Sent)
    }

    /// Record a slot release and prune the log to the estimate window.
    pub fn note_release(&mut self, at: DateTime<Utc>) {
        self.release_log.push_back(at);
        let horizon = at - Duration::days(RELEASE_WINDOW_DAYS);
        while self
            .release_log
            .front()
            .is_some_and(|&first| first < horizon)
        {
            self.release_log.pop_front();
        }
    }

    /// Rough "expected slots released per day" estimate from the trailing
    /// release history. Informational only.
    #[must_use]
    pub fn release_rate_per_day(&self, now: DateTime<Utc>) -> f64 {
        let horizon = now - Duration::days(RELEASE_WINDOW_DAYS);
        let recent = self
            .release_log
            .iter()
            .filter(|&&at| at >= horizon)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let recent = recent as f64;
        recent / RELEASE_WINDOW_DAYS as f64
    }

    /// Registrations whose payment deadline has passed.
    #[must_use]
    pub fn due_pending(&self, now: DateTime<Utc>) -> Vec<RegistrationId> {
        let mut due: Vec<_> = self
            .registrations
            .values()
            .filter(|r| {
                r.status == RegistrationStatus::Pending
                    && r.expires_at.is_some_and(|deadline| now > deadline)
            })
            .map(|r| (r.created_at, r.id))
            .collect();
        due.sort_by_key(|&(created_at, _)| created_at);
        due.into_iter().map(|(_, id)| id).collect()
    }
}
