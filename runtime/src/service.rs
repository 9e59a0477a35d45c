//! The exit queue service.
//!
//! [`QueueService`] is the public contract of the queue: it wraps a
//! [`QueueStore`] (which owns atomicity) and a [`NotificationPort`] (which owns
//! the "your turn" signal). Every call runs to completion before returning.
//! There are no timers or background tasks; clients learn their place by
//! calling [`QueueService::status`] again.

use kwikout_core::error::{QueueError, Result};
use kwikout_core::notification::{NotificationError, NotificationPort};
use kwikout_core::store::QueueStore;
use kwikout_core::ticket::{QueueStatus, Ticket, TicketId, TicketState, UserId, Zone};

/// Outcome of a successful [`QueueService::advance`].
///
/// The promotion is committed regardless of `notification`. A failed
/// notification can be re-sent with [`QueueService::retry_notification`];
/// until one is delivered the ticket cannot be completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advanced {
    /// The ticket that is now `Current`
    pub ticket: Ticket,
    /// Result of telling the driver
    pub notification: std::result::Result<(), NotificationError>,
}

impl Advanced {
    /// Whether the notification port accepted the signal.
    #[must_use]
    pub const fn notified(&self) -> bool {
        self.notification.is_ok()
    }
}

/// Per-zone FIFO exit queue.
///
/// # Type Parameters
///
/// - `S`: Storage backend (`PostgresQueueStore` in production,
///   `InMemoryQueueStore` in tests)
/// - `N`: Notification adapter
///
/// # Example
///
/// ```
/// use kwikout_core::ticket::{UserId, Zone};
/// use kwikout_runtime::{LoggingNotifier, QueueService};
/// use kwikout_testing::InMemoryQueueStore;
///
/// # async fn example() -> Result<(), kwikout_core::QueueError> {
/// let service = QueueService::new(InMemoryQueueStore::new(), LoggingNotifier);
///
/// let ticket = service.join(UserId::new("driver-1"), Zone::A).await?;
/// assert_eq!(ticket.position, 1);
///
/// if let Some(advanced) = service.advance(Zone::A).await? {
///     assert_eq!(advanced.ticket.id, ticket.id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueueService<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> QueueService<S, N>
where
    S: QueueStore,
    N: NotificationPort,
{
    /// Create a service over `store`, announcing promotions through `notifier`.
    #[must_use]
    pub const fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Enter `zone`'s queue as `Waiting` at the back of the line.
    ///
    /// # Errors
    ///
    /// - [`QueueError::DuplicateActiveTicket`] if the user already holds an
    ///   active ticket in any zone
    /// - [`QueueError::Contention`] if the zone stayed busy past the retry budget
    #[tracing::instrument(skip(self), name = "queue_join")]
    pub async fn join(&self, user_id: UserId, zone: Zone) -> Result<Ticket> {
        let ticket = self.store.insert(user_id, zone).await?;

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            zone = %zone,
            position = ticket.position,
            "Joined queue"
        );
        metrics::counter!("queue.joined", "zone" => zone.as_str()).increment(1);

        Ok(ticket)
    }

    /// Current view of a ticket and how many active tickets precede it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for an unknown ticket.
    pub async fn status(&self, ticket_id: TicketId) -> Result<QueueStatus> {
        self.store.status(ticket_id).await
    }

    /// The user's `Waiting` or `Current` ticket, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn active_ticket(&self, user_id: &UserId) -> Result<Option<Ticket>> {
        self.store.get(user_id.clone()).await
    }

    /// Promote the `Waiting` ticket with the smallest position in `zone`.
    ///
    /// Returns `None` when nobody is waiting. On promotion the notification
    /// port is called exactly once. A delivered notification is recorded on
    /// the ticket; a failed one is logged and reported in
    /// [`Advanced::notification`] but never undoes the promotion.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Contention`] if the zone stayed busy past the retry
    /// budget, or a storage error if the delivery could not be recorded (the
    /// ticket stays `Current`). Notification failures are not errors here.
    #[tracing::instrument(skip(self), name = "queue_advance")]
    pub async fn advance(&self, zone: Zone) -> Result<Option<Advanced>> {
        let Some(ticket) = self.store.mark_current(zone).await? else {
            tracing::debug!(zone = %zone, "Nobody waiting");
            return Ok(None);
        };

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            zone = %zone,
            position = ticket.position,
            "Ticket is now current"
        );
        metrics::counter!("queue.advanced", "zone" => zone.as_str()).increment(1);

        let notification = self.notifier.notify_current(&ticket).await;
        let ticket = match &notification {
            Ok(()) => self.store.mark_notified(ticket.id).await?,
            Err(error) => {
                record_notification_failure(&ticket, error);
                ticket
            }
        };

        Ok(Some(Advanced {
            ticket,
            notification,
        }))
    }

    /// Mark a `Current` ticket as `Exited`.
    ///
    /// The driver must have been notified first, either by [`Self::advance`]
    /// or by [`Self::retry_notification`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidTransition`] if the ticket is not `Current` or
    ///   its notification has not been delivered
    /// - [`QueueError::NotFound`] for an unknown ticket
    #[tracing::instrument(skip(self), name = "queue_complete")]
    pub async fn complete(&self, ticket_id: TicketId) -> Result<Ticket> {
        let ticket = self.store.complete(ticket_id).await?;

        tracing::info!(
            ticket_id = %ticket.id,
            zone = %ticket.zone,
            position = ticket.position,
            "Ticket exited"
        );
        metrics::counter!("queue.completed", "zone" => ticket.zone.as_str()).increment(1);

        Ok(ticket)
    }

    /// Leave the queue.
    ///
    /// Cancelling a ticket that is already `Exited` or `Cancelled` returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for an unknown ticket.
    #[tracing::instrument(skip(self), name = "queue_cancel")]
    pub async fn cancel(&self, ticket_id: TicketId) -> Result<Ticket> {
        let before = self.store.ticket(ticket_id).await?;
        if before.state.is_terminal() {
            tracing::debug!(
                ticket_id = %ticket_id,
                state = %before.state,
                "Cancel on terminal ticket is a no-op"
            );
            return Ok(before);
        }

        let ticket = self.store.cancel(ticket_id).await?;
        if ticket.state == TicketState::Cancelled {
            tracing::info!(
                ticket_id = %ticket.id,
                zone = %ticket.zone,
                from = %before.state,
                "Ticket cancelled"
            );
            metrics::counter!("queue.cancelled", "zone" => ticket.zone.as_str()).increment(1);
        }

        Ok(ticket)
    }

    /// Cancel whatever the user is queued for, ending their session.
    ///
    /// Returns the cancelled ticket, or `None` if the user held nothing active.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup or the cancellation fails.
    #[tracing::instrument(skip(self), name = "queue_logout")]
    pub async fn logout(&self, user_id: &UserId) -> Result<Option<Ticket>> {
        match self.active_ticket(user_id).await? {
            Some(ticket) => self.cancel(ticket.id).await.map(Some),
            None => {
                tracing::debug!(user_id = %user_id, "Logout with no active ticket");
                Ok(None)
            }
        }
    }

    /// Re-send the "your turn" signal for a ticket that is still `Current`.
    ///
    /// On delivery the ticket is marked notified and may be completed.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidTransition`] if the ticket is no longer `Current`
    /// - [`QueueError::Notification`] if the port fails again
    /// - [`QueueError::NotFound`] for an unknown ticket
    #[tracing::instrument(skip(self), name = "queue_retry_notification")]
    pub async fn retry_notification(&self, ticket_id: TicketId) -> Result<()> {
        let ticket = self.store.ticket(ticket_id).await?;
        if ticket.state != TicketState::Current {
            return Err(QueueError::InvalidTransition {
                ticket_id,
                from: ticket.state,
                to: TicketState::Current,
            });
        }

        match self.notifier.notify_current(&ticket).await {
            Ok(()) => {
                self.store.mark_notified(ticket_id).await?;
                tracing::info!(ticket_id = %ticket_id, "Notification re-sent");
                Ok(())
            }
            Err(error) => {
                record_notification_failure(&ticket, &error);
                Err(QueueError::Notification(error))
            }
        }
    }

    /// Active tickets in `zone`, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn snapshot(&self, zone: Zone) -> Result<Vec<Ticket>> {
        self.store.active(zone).await
    }
}

fn record_notification_failure(ticket: &Ticket, error: &NotificationError) {
    tracing::warn!(
        ticket_id = %ticket.id,
        zone = %ticket.zone,
        error = %error,
        "Notification failed; ticket stays current"
    );
    metrics::counter!("queue.notification.failed", "zone" => ticket.zone.as_str()).increment(1);
}
