//! Default notification adapter.

use kwikout_core::notification::{NotificationError, NotificationPort};
use kwikout_core::ticket::Ticket;
use std::future::Future;
use std::pin::Pin;

/// [`NotificationPort`] that writes the promotion to the log and always succeeds.
///
/// Used when no directions service is wired in: drivers learn they are up by
/// polling their status.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl NotificationPort for LoggingNotifier {
    fn notify_current(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send + '_>> {
        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            zone = %ticket.zone,
            position = ticket.position,
            "Driver may proceed to the exit"
        );

        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwikout_core::environment::Clock;
    use kwikout_core::ticket::{UserId, Zone};
    use kwikout_testing::test_clock;

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let ticket = Ticket::waiting(UserId::new("u1"), Zone::B, 3, test_clock().now());

        assert_eq!(LoggingNotifier.notify_current(&ticket).await, Ok(()));
    }
}
