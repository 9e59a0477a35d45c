//! Queue store trait.
//!
//! The `QueueStore` owns every mutation of queue state. Implementations must
//! serialize mutations per zone so that position assignment, advancement and
//! cancellation never interleave: two concurrent `insert` calls for one zone
//! must never observe the same "max position" snapshot.
//!
//! # Implementations
//!
//! - `PostgresQueueStore` (in `kwikout-postgres`): durable, zone row locks, bounded retries
//! - `InMemoryQueueStore` (in `kwikout-testing`): fast, deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use kwikout_core::store::QueueStore;
//! use kwikout_core::ticket::{UserId, Zone};
//! use kwikout_core::error::QueueError;
//!
//! async fn example<S: QueueStore>(store: &S) -> Result<(), QueueError> {
//!     let ticket = store.insert(UserId::new("driver-1"), Zone::A).await?;
//!     let promoted = store.mark_current(Zone::A).await?;
//!     assert_eq!(promoted.map(|t| t.id), Some(ticket.id));
//!     store.mark_notified(ticket.id).await?;
//!     store.complete(ticket.id).await?;
//!     Ok(())
//! }
//! ```

use crate::error::QueueError;
use crate::ticket::{QueueStatus, Ticket, TicketId, UserId, Zone};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`QueueStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Durable, transactional storage of tickets with atomic position assignment.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every caller.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] rather than using `async fn` so the store can
/// be held as `Arc<dyn QueueStore>`.
pub trait QueueStore: Send + Sync {
    /// Append a `Waiting` ticket for `user_id` at the tail of `zone`.
    ///
    /// The position is `1 + max(position)` over the zone's `Waiting`/`Current`
    /// tickets, or 1 if there are none. Reading the max and writing the ticket
    /// happen as one atomic step.
    ///
    /// # Errors
    ///
    /// - `DuplicateActiveTicket`: the user already holds an active ticket
    /// - `Contention`: the zone stayed locked past the retry budget
    /// - `Database`: storage failure
    fn insert(&self, user_id: UserId, zone: Zone) -> StoreFuture<'_, Ticket>;

    /// Promote the `Waiting` ticket with the smallest position in `zone` to `Current`.
    ///
    /// Returns `None` when nothing in the zone is waiting.
    ///
    /// # Errors
    ///
    /// - `Contention`: the zone stayed locked past the retry budget
    /// - `Database`: storage failure
    fn mark_current(&self, zone: Zone) -> StoreFuture<'_, Option<Ticket>>;

    /// Record that the driver of a `Current` ticket has been notified.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `InvalidTransition`: the ticket is not `Current`
    /// - `Contention` / `Database`
    fn mark_notified(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket>;

    /// Transition a `Current`, notified ticket to `Exited`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `InvalidTransition`: the ticket is not `Current`, or its driver has
    ///   not been notified yet
    /// - `Contention` / `Database`
    fn complete(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket>;

    /// Transition a `Waiting` or `Current` ticket to `Cancelled`.
    ///
    /// Idempotent: a terminal ticket is returned unchanged and nothing is written.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `Contention` / `Database`
    fn cancel(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket>;

    /// The user's active (`Waiting`/`Current`) ticket, if any.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn get(&self, user_id: UserId) -> StoreFuture<'_, Option<Ticket>>;

    /// Load a ticket in any state.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `Database`: storage failure
    fn ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket>;

    /// A ticket together with the number of active tickets ahead of it,
    /// read from one consistent snapshot.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `Database`: storage failure
    fn status(&self, ticket_id: TicketId) -> StoreFuture<'_, QueueStatus>;

    /// The zone's active tickets ordered by position.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn active(&self, zone: Zone) -> StoreFuture<'_, Vec<Ticket>>;
}

impl<T: QueueStore + ?Sized> QueueStore for Arc<T> {
    fn insert(&self, user_id: UserId, zone: Zone) -> StoreFuture<'_, Ticket> {
        (**self).insert(user_id, zone)
    }

    fn mark_current(&self, zone: Zone) -> StoreFuture<'_, Option<Ticket>> {
        (**self).mark_current(zone)
    }

    fn mark_notified(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        (**self).mark_notified(ticket_id)
    }

    fn complete(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        (**self).complete(ticket_id)
    }

    fn cancel(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        (**self).cancel(ticket_id)
    }

    fn get(&self, user_id: UserId) -> StoreFuture<'_, Option<Ticket>> {
        (**self).get(user_id)
    }

    fn ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        (**self).ticket(ticket_id)
    }

    fn status(&self, ticket_id: TicketId) -> StoreFuture<'_, QueueStatus> {
        (**self).status(ticket_id)
    }

    fn active(&self, zone: Zone) -> StoreFuture<'_, Vec<Ticket>> {
        (**self).active(zone)
    }
}
