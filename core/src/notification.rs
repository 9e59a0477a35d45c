//! Outbound notification port.
//!
//! When `advance` promotes a ticket to `Current`, the queue service tells the
//! outside world through a [`NotificationPort`]. The production adapter (route
//! lookup and a directions link for the driver) lives outside this workspace;
//! the core only depends on the capability.
//!
//! Notification is best-effort: a failure never rolls back the promotion.

use crate::ticket::Ticket;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure reported by a notification adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The downstream service could not be reached.
    #[error("Notification service unavailable: {0}")]
    Unavailable(String),

    /// The downstream service refused the request.
    #[error("Notification rejected: {reason}")]
    Rejected {
        /// Reason given by the service
        reason: String,
    },

    /// The downstream service did not answer in time.
    #[error("Notification timed out")]
    Timeout,
}

/// Capability the queue service uses to announce that a ticket became `Current`.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so adapters can be shared as
/// `Arc<dyn NotificationPort>`.
pub trait NotificationPort: Send + Sync {
    /// Announce that `ticket` may now proceed to the exit.
    ///
    /// # Errors
    ///
    /// Returns a [`NotificationError`] if delivery failed. The caller keeps the
    /// ticket `Current` and may retry.
    fn notify_current(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>>;
}

impl<T: NotificationPort + ?Sized> NotificationPort for std::sync::Arc<T> {
    fn notify_current(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>> {
        (**self).notify_current(ticket)
    }
}
