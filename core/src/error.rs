//! Error taxonomy for exit queue operations.

use crate::notification::NotificationError;
use crate::ticket::{TicketId, TicketState, UserId, Zone};
use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Everything that can go wrong while joining, advancing or leaving a queue.
///
/// Every variant except [`QueueError::Notification`] means the call changed
/// nothing: the transactional step either committed whole or not at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The user already holds a `Waiting` or `Current` ticket.
    #[error("User {user_id} already holds active ticket {existing}")]
    DuplicateActiveTicket {
        /// The user attempting to join
        user_id: UserId,
        /// Their existing active ticket
        existing: TicketId,
    },

    /// The requested state change is not an edge of the ticket state machine.
    #[error("Invalid transition for ticket {ticket_id}: {from} -> {to}")]
    InvalidTransition {
        /// Ticket that was targeted
        ticket_id: TicketId,
        /// State it is in
        from: TicketState,
        /// State that was requested
        to: TicketState,
    },

    /// No record matched the lookup.
    #[error("{resource} not found: {key}")]
    NotFound {
        /// Kind of record (`"ticket"`, `"active ticket"`, ...)
        resource: &'static str,
        /// Lookup key rendered for display
        key: String,
    },

    /// Conflicting writers kept the zone busy past the retry budget.
    #[error("Zone {zone} is contended; gave up after {attempts} attempts")]
    Contention {
        /// Zone whose lock or snapshot could not be obtained
        zone: Zone,
        /// Attempts made, including the first
        attempts: u32,
    },

    /// The notification port failed for a ticket that is (still) `Current`.
    #[error("Notification failed: {0}")]
    Notification(#[from] NotificationError),

    /// Zone identifier outside the closed set.
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// Empty or blank user identifier.
    #[error("User ID cannot be empty")]
    InvalidUserId,

    /// Storage failure that is not a transient conflict.
    #[error("Database error: {0}")]
    Database(String),
}

impl QueueError {
    /// Shorthand for a missing ticket.
    #[must_use]
    pub fn ticket_not_found(ticket_id: TicketId) -> Self {
        Self::NotFound {
            resource: "ticket",
            key: ticket_id.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same call later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. } | Self::Notification(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_error_display() {
        let error = QueueError::Contention {
            zone: Zone::B,
            attempts: 4,
        };
        let display = format!("{error}");
        assert!(display.contains("Zone B"));
        assert!(display.contains("4 attempts"));
        assert!(error.is_retryable());
    }

    #[test]
    fn not_found_error_display() {
        let id = TicketId::new();
        let display = format!("{}", QueueError::ticket_not_found(id));
        assert!(display.starts_with("ticket not found"));
        assert!(display.contains(&id.to_string()));
    }

    #[test]
    fn invalid_transition_is_not_retryable() {
        let error = QueueError::InvalidTransition {
            ticket_id: TicketId::new(),
            from: TicketState::Exited,
            to: TicketState::Current,
        };
        assert!(format!("{error}").contains("exited -> current"));
        assert!(!error.is_retryable());
    }
}
