//! Recording notification port.

use kwikout_core::notification::{NotificationError, NotificationPort};
use kwikout_core::ticket::{Ticket, TicketId};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Log {
    attempts: Vec<TicketId>,
    delivered: Vec<Ticket>,
    scripted_failures: VecDeque<NotificationError>,
    always_fail: Option<NotificationError>,
}

/// [`NotificationPort`] that records every call and can be scripted to fail.
///
/// # Example
///
/// ```
/// use kwikout_testing::RecordingNotifier;
/// use kwikout_core::notification::NotificationError;
///
/// let notifier = RecordingNotifier::new();
/// notifier.fail_next(NotificationError::Timeout);
/// assert!(notifier.delivered().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    log: Arc<Mutex<Log>>,
}

#[allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
impl RecordingNotifier {
    /// Create a notifier that succeeds until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier that fails every call with `error`.
    #[must_use]
    pub fn failing(error: NotificationError) -> Self {
        let notifier = Self::new();
        notifier.log.lock().unwrap().always_fail = Some(error);
        notifier
    }

    /// Make the next call fail with `error`. Calls queue up in order.
    pub fn fail_next(&self, error: NotificationError) {
        self.log.lock().unwrap().scripted_failures.push_back(error);
    }

    /// Stop failing every call.
    pub fn recover(&self) {
        self.log.lock().unwrap().always_fail = None;
    }

    /// Ticket IDs of every call, successful or not, in call order.
    #[must_use]
    pub fn attempts(&self) -> Vec<TicketId> {
        self.log.lock().unwrap().attempts.clone()
    }

    /// Tickets whose notification succeeded, in call order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Ticket> {
        self.log.lock().unwrap().delivered.clone()
    }
}

impl NotificationPort for RecordingNotifier {
    fn notify_current(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>> {
        let log = Arc::clone(&self.log);
        let ticket = ticket.clone();

        Box::pin(async move {
            let mut log = log
                .lock()
                .map_err(|_| NotificationError::Unavailable("notifier log poisoned".to_string()))?;
            log.attempts.push(ticket.id);

            if let Some(error) = log.scripted_failures.pop_front() {
                return Err(error);
            }
            if let Some(error) = log.always_fail.clone() {
                return Err(error);
            }

            log.delivered.push(ticket);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kwikout_core::ticket::{UserId, Zone};

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let notifier = RecordingNotifier::new();
        notifier.fail_next(NotificationError::Timeout);
        let ticket = Ticket::waiting(UserId::new("u1"), Zone::A, 1, Utc::now());

        assert_eq!(
            notifier.notify_current(&ticket).await,
            Err(NotificationError::Timeout)
        );
        assert!(notifier.notify_current(&ticket).await.is_ok());
        assert_eq!(notifier.attempts().len(), 2);
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn failing_notifier_recovers() {
        let notifier = RecordingNotifier::failing(NotificationError::Unavailable("down".into()));
        let ticket = Ticket::waiting(UserId::new("u1"), Zone::B, 1, Utc::now());

        assert!(notifier.notify_current(&ticket).await.is_err());
        notifier.recover();
        assert!(notifier.notify_current(&ticket).await.is_ok());
    }
}
