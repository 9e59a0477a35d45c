//! Exit queue domain types.
//!
//! A [`Ticket`] is one user's claim on a position in a [`Zone`]'s exit queue.
//! Tickets move through the [`TicketState`] machine and are never deleted:
//! terminal tickets stay in storage as the audit trail.
//!
//! ```text
//!            advance(zone)           complete(id)
//!  Waiting ───────────────► Current ─────────────► Exited
//!     │                        │
//!     │ cancel / logout        │ cancel / logout
//!     └──────────► Cancelled ◄─┘
//! ```

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ticket, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the person requesting to exit.
///
/// Identity is owned by the auth provider; the queue only needs a stable key.
///
/// # Validation
///
/// - [`UserId::parse`] / `FromStr`: trims and rejects empty input (use for external input)
/// - [`UserId::new`]: no validation (trusted, application-controlled values)
///
/// # Examples
///
/// ```
/// use kwikout_core::ticket::UserId;
///
/// let user: UserId = " driver-17 ".parse().unwrap();
/// assert_eq!(user.as_str(), "driver-17");
/// assert!("   ".parse::<UserId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a `UserId` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a `UserId` from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidUserId`] if the input is empty after trimming.
    pub fn parse(s: &str) -> Result<Self, QueueError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(QueueError::InvalidUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the user ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Zone
// ============================================================================

/// A closed category partitioning the exit queue into independent FIFOs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Zone {
    /// Zone A
    A,
    /// Zone B
    B,
    /// Zone C
    C,
}

impl Zone {
    /// Every zone, in display order.
    pub const ALL: [Self; 3] = [Self::A, Self::B, Self::C];

    /// Storage and display form of the zone.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Parse a zone identifier (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownZone`] for anything outside the closed set.
    ///
    /// # Examples
    ///
    /// ```
    /// use kwikout_core::ticket::Zone;
    ///
    /// assert_eq!(Zone::parse("b").unwrap(), Zone::B);
    /// assert!(Zone::parse("D").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, QueueError> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            other => Err(QueueError::UnknownZone(other.to_string())),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketState {
    /// Queued behind other tickets in the zone
    Waiting,
    /// Authorized to proceed to the exit
    Current,
    /// Left the zone (terminal)
    Exited,
    /// Withdrawn before exiting (terminal)
    Cancelled,
}

impl TicketState {
    /// Convert state to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Current => "current",
            Self::Exited => "exited",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse state from database string.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the string doesn't match a known state.
    pub fn parse(s: &str) -> Result<Self, QueueError> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "current" => Ok(Self::Current),
            "exited" => Ok(Self::Exited),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(QueueError::Database(format!("Invalid ticket state: {s}"))),
        }
    }

    /// `Waiting` or `Current`: the ticket holds a position in its zone.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Current)
    }

    /// `Exited` or `Cancelled`: no further mutation is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// # Examples
    ///
    /// ```
    /// use kwikout_core::ticket::TicketState;
    ///
    /// assert!(TicketState::Waiting.can_transition_to(TicketState::Current));
    /// assert!(!TicketState::Waiting.can_transition_to(TicketState::Exited));
    /// assert!(!TicketState::Exited.can_transition_to(TicketState::Cancelled));
    /// ```
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Current)
                | (Self::Current, Self::Exited)
                | (Self::Waiting | Self::Current, Self::Cancelled)
        )
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// A single user's claim on a queue position within a zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier
    pub id: TicketId,
    /// Who is queueing
    pub user_id: UserId,
    /// Which zone's queue the ticket belongs to
    pub zone: Zone,
    /// Rank assigned at join time; unique among the zone's active tickets
    pub position: u32,
    /// Lifecycle state
    pub state: TicketState,
    /// When the ticket was created
    pub created_at: DateTime<Utc>,
    /// When the ticket last changed state
    pub updated_at: DateTime<Utc>,
    /// When the driver was last told it is their turn; `None` until a
    /// notification for the `Current` ticket has been delivered
    pub notified_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Create a freshly joined ticket in the `Waiting` state.
    #[must_use]
    pub fn waiting(user_id: UserId, zone: Zone, position: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            user_id,
            zone,
            position,
            state: TicketState::Waiting,
            created_at: now,
            updated_at: now,
            notified_at: None,
        }
    }

    /// Apply a state transition, enforcing the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if `next` is not reachable from
    /// the current state. `Current -> Exited` is only reachable once the driver
    /// has been notified.
    pub fn transition(&mut self, next: TicketState, now: DateTime<Utc>) -> Result<(), QueueError> {
        let awaiting_notification = next == TicketState::Exited && self.notified_at.is_none();
        if !self.state.can_transition_to(next) || awaiting_notification {
            return Err(QueueError::InvalidTransition {
                ticket_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record a delivered "your turn" notification.
    ///
    /// A re-sent notification moves the timestamp forward.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] (towards `Current`) if the
    /// ticket is not `Current`.
    pub fn mark_notified(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        if self.state != TicketState::Current {
            return Err(QueueError::InvalidTransition {
                ticket_id: self.id,
                from: self.state,
                to: TicketState::Current,
            });
        }
        self.notified_at = Some(now);
        Ok(())
    }

    /// Whether the driver has been told to proceed.
    #[must_use]
    pub const fn is_notified(&self) -> bool {
        self.notified_at.is_some()
    }

    /// Whether the ticket still holds a position in its zone.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Server-side view of where a ticket stands.
///
/// Replaces client-side countdowns: callers poll this instead of guessing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// The ticket as currently stored
    pub ticket: Ticket,
    /// Active tickets in the same zone with a smaller position
    pub ahead: u32,
}

impl QueueStatus {
    /// One-based place in line, or `None` once the ticket is terminal.
    #[must_use]
    pub const fn place(&self) -> Option<u32> {
        if self.ticket.state.is_active() {
            Some(self.ahead + 1)
        } else {
            None
        }
    }

    /// Whether the ticket is authorized to exit right now.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.ticket.state == TicketState::Current
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ticket_state_roundtrip() {
        for state in [
            TicketState::Waiting,
            TicketState::Current,
            TicketState::Exited,
            TicketState::Cancelled,
        ] {
            let parsed = TicketState::parse(state.as_str()).expect("valid state should parse");
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn ticket_state_invalid() {
        assert!(matches!(
            TicketState::parse("pending"),
            Err(QueueError::Database(_))
        ));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let all = [
            TicketState::Waiting,
            TicketState::Current,
            TicketState::Exited,
            TicketState::Cancelled,
        ];
        for from in [TicketState::Exited, TicketState::Cancelled] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn current_is_reached_only_from_waiting() {
        assert!(TicketState::Waiting.can_transition_to(TicketState::Current));
        assert!(!TicketState::Current.can_transition_to(TicketState::Current));
        assert!(!TicketState::Current.can_transition_to(TicketState::Waiting));
    }

    #[test]
    fn zone_parse_is_case_insensitive_and_closed() {
        assert_eq!(Zone::parse("a").unwrap(), Zone::A);
        assert_eq!(" C ".parse::<Zone>().unwrap(), Zone::C);
        assert!(matches!(Zone::parse("Z"), Err(QueueError::UnknownZone(z)) if z == "Z"));
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut ticket = Ticket::waiting(UserId::new("u1"), Zone::A, 1, Utc::now());
        let err = ticket
            .transition(TicketState::Exited, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: TicketState::Waiting,
                to: TicketState::Exited,
                ..
            }
        ));
        assert_eq!(ticket.state, TicketState::Waiting);
    }

    #[test]
    fn transition_updates_timestamp() {
        let created = Utc::now();
        let mut ticket = Ticket::waiting(UserId::new("u1"), Zone::B, 3, created);
        let later = created + chrono::Duration::seconds(5);
        ticket.transition(TicketState::Current, later).unwrap();
        assert_eq!(ticket.state, TicketState::Current);
        assert_eq!(ticket.updated_at, later);
        assert_eq!(ticket.created_at, created);
        assert_eq!(ticket.position, 3);
    }

    #[test]
    fn exit_requires_delivered_notification() {
        let now = Utc::now();
        let mut ticket = Ticket::waiting(UserId::new("u1"), Zone::A, 1, now);
        ticket.transition(TicketState::Current, now).unwrap();

        let err = ticket.transition(TicketState::Exited, now).unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: TicketState::Current,
                to: TicketState::Exited,
                ..
            }
        ));
        assert_eq!(ticket.state, TicketState::Current);

        ticket.mark_notified(now).unwrap();
        ticket.transition(TicketState::Exited, now).unwrap();
        assert_eq!(ticket.state, TicketState::Exited);
        assert_eq!(ticket.notified_at, Some(now));
    }

    #[test]
    fn only_current_tickets_can_be_notified() {
        let mut ticket = Ticket::waiting(UserId::new("u1"), Zone::C, 4, Utc::now());

        assert!(ticket.mark_notified(Utc::now()).is_err());
        assert!(!ticket.is_notified());
    }

    #[test]
    fn place_is_none_for_terminal_ticket() {
        let mut ticket = Ticket::waiting(UserId::new("u1"), Zone::A, 2, Utc::now());
        let status = QueueStatus { ticket: ticket.clone(), ahead: 1 };
        assert_eq!(status.place(), Some(2));

        ticket.transition(TicketState::Cancelled, Utc::now()).unwrap();
        let status = QueueStatus { ticket, ahead: 0 };
        assert_eq!(status.place(), None);
    }
}
