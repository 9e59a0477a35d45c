//! In-memory queue store for tests and local development.
//!
//! Mirrors the durability contract of `PostgresQueueStore` without a database:
//! each zone is a lane guarded by its own async mutex (the stand-in for the
//! zone row lock), tickets are never removed, and lock acquisition is bounded
//! so a stuck writer surfaces as `Contention` instead of a hang.

use kwikout_core::environment::{Clock, SystemClock};
use kwikout_core::error::QueueError;
use kwikout_core::store::{QueueStore, StoreFuture};
use kwikout_core::ticket::{QueueStatus, Ticket, TicketId, TicketState, UserId, Zone};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// How long a call waits for a zone lane before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

type Lane = Arc<AsyncMutex<Vec<Ticket>>>;

/// In-memory [`QueueStore`].
///
/// Cloning shares the underlying state.
///
/// # Example
///
/// ```
/// use kwikout_testing::InMemoryQueueStore;
/// use kwikout_core::store::QueueStore;
/// use kwikout_core::ticket::{UserId, Zone};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryQueueStore::new();
/// let first = store.insert(UserId::new("u1"), Zone::A).await?;
/// let second = store.insert(UserId::new("u2"), Zone::A).await?;
/// assert_eq!((first.position, second.position), (1, 2));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryQueueStore {
    lanes: Arc<HashMap<Zone, Lane>>,
    /// user -> their single active ticket; claimed and released atomically
    active_users: Arc<Mutex<HashMap<UserId, TicketId>>>,
    /// ticket -> zone; zones are immutable so this never changes after insert
    locations: Arc<Mutex<HashMap<TicketId, Zone>>>,
    writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

/// Keeps a zone lane locked until dropped.
///
/// Lets tests play the part of a writer that never finishes.
pub struct ZoneHold {
    _guard: OwnedMutexGuard<Vec<Ticket>>,
}

fn poisoned() -> QueueError {
    QueueError::Database("in-memory store lock poisoned".to_string())
}

impl InMemoryQueueStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let lanes = Zone::ALL
            .into_iter()
            .map(|zone| (zone, Arc::new(AsyncMutex::new(Vec::new()))))
            .collect();
        Self {
            lanes: Arc::new(lanes),
            active_users: Arc::new(Mutex::new(HashMap::new())),
            locations: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
            clock,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override how long calls wait for a zone lane.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Number of committed writes so far.
    ///
    /// Useful for asserting that a call was a no-op.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every ticket ever created in `zone`, terminal ones included, in join order.
    ///
    /// # Errors
    ///
    /// Returns `Contention` if the lane cannot be locked in time.
    pub async fn history(&self, zone: Zone) -> Result<Vec<Ticket>, QueueError> {
        Ok(self.lane(zone).await?.clone())
    }

    /// Lock a zone lane and keep it locked until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Contention` if the lane is already held past the lock timeout.
    pub async fn hold_zone(&self, zone: Zone) -> Result<ZoneHold, QueueError> {
        Ok(ZoneHold {
            _guard: self.lane(zone).await?,
        })
    }

    async fn lane(&self, zone: Zone) -> Result<OwnedMutexGuard<Vec<Ticket>>, QueueError> {
        let lane = self
            .lanes
            .get(&zone)
            .cloned()
            .ok_or_else(|| QueueError::UnknownZone(zone.to_string()))?;

        tokio::time::timeout(self.lock_timeout, lane.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    zone = %zone,
                    timeout_ms = self.lock_timeout.as_millis(),
                    "Timed out waiting for zone lane"
                );
                QueueError::Contention { zone, attempts: 1 }
            })
    }

    fn zone_of(&self, ticket_id: TicketId) -> Result<Zone, QueueError> {
        self.locations
            .lock()
            .map_err(|_| poisoned())?
            .get(&ticket_id)
            .copied()
            .ok_or_else(|| QueueError::ticket_not_found(ticket_id))
    }

    fn release_user(&self, ticket: &Ticket) -> Result<(), QueueError> {
        let mut users = self.active_users.lock().map_err(|_| poisoned())?;
        if users.get(&ticket.user_id) == Some(&ticket.id) {
            users.remove(&ticket.user_id);
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueueStore")
            .field("writes", &self.write_count())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn insert(&self, user_id: UserId, zone: Zone) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let mut lane = self.lane(zone).await?;

            let position = lane
                .iter()
                .filter(|t| t.is_active())
                .map(|t| t.position)
                .max()
                .map_or(1, |max| max + 1);
            let ticket = Ticket::waiting(user_id, zone, position, self.clock.now());

            {
                let mut users = self.active_users.lock().map_err(|_| poisoned())?;
                if let Some(existing) = users.get(&ticket.user_id).copied() {
                    return Err(QueueError::DuplicateActiveTicket {
                        user_id: ticket.user_id,
                        existing,
                    });
                }
                users.insert(ticket.user_id.clone(), ticket.id);
            }
            self.locations
                .lock()
                .map_err(|_| poisoned())?
                .insert(ticket.id, zone);

            lane.push(ticket.clone());
            self.record_write();

            tracing::debug!(
                ticket_id = %ticket.id,
                zone = %zone,
                position,
                "Ticket inserted"
            );
            Ok(ticket)
        })
    }

    fn mark_current(&self, zone: Zone) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let mut lane = self.lane(zone).await?;
            let now = self.clock.now();

            let Some(next) = lane
                .iter_mut()
                .filter(|t| t.state == TicketState::Waiting)
                .min_by_key(|t| t.position)
            else {
                return Ok(None);
            };

            next.transition(TicketState::Current, now)?;
            let promoted = next.clone();
            self.record_write();
            Ok(Some(promoted))
        })
    }

    fn mark_notified(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id)?;
            let mut lane = self.lane(zone).await?;
            let now = self.clock.now();

            let ticket = lane
                .iter_mut()
                .find(|t| t.id == ticket_id)
                .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            ticket.mark_notified(now)?;
            let notified = ticket.clone();
            self.record_write();
            Ok(notified)
        })
    }

    fn complete(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id)?;
            let mut lane = self.lane(zone).await?;
            let now = self.clock.now();

            let ticket = lane
                .iter_mut()
                .find(|t| t.id == ticket_id)
                .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            ticket.transition(TicketState::Exited, now)?;
            let exited = ticket.clone();
            self.release_user(&exited)?;
            self.record_write();
            Ok(exited)
        })
    }

    fn cancel(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id)?;
            let mut lane = self.lane(zone).await?;
            let now = self.clock.now();

            let ticket = lane
                .iter_mut()
                .find(|t| t.id == ticket_id)
                .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            if ticket.state.is_terminal() {
                return Ok(ticket.clone());
            }

            ticket.transition(TicketState::Cancelled, now)?;
            let cancelled = ticket.clone();
            self.release_user(&cancelled)?;
            self.record_write();
            Ok(cancelled)
        })
    }

    fn get(&self, user_id: UserId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let Some(ticket_id) = self
                .active_users
                .lock()
                .map_err(|_| poisoned())?
                .get(&user_id)
                .copied()
            else {
                return Ok(None);
            };

            let zone = self.zone_of(ticket_id)?;
            let lane = self.lane(zone).await?;
            Ok(lane
                .iter()
                .find(|t| t.id == ticket_id && t.is_active())
                .cloned())
        })
    }

    fn ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id)?;
            let lane = self.lane(zone).await?;
            lane.iter()
                .find(|t| t.id == ticket_id)
                .cloned()
                .ok_or_else(|| QueueError::ticket_not_found(ticket_id))
        })
    }

    fn status(&self, ticket_id: TicketId) -> StoreFuture<'_, QueueStatus> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id)?;
            let lane = self.lane(zone).await?;

            let ticket = lane
                .iter()
                .find(|t| t.id == ticket_id)
                .cloned()
                .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            let ahead = if ticket.is_active() {
                lane.iter()
                    .filter(|t| t.is_active() && t.position < ticket.position)
                    .count()
            } else {
                0
            };

            Ok(QueueStatus {
                ticket,
                ahead: u32::try_from(ahead).unwrap_or(u32::MAX),
            })
        })
    }

    fn active(&self, zone: Zone) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let lane = self.lane(zone).await?;
            let mut active: Vec<Ticket> = lane.iter().filter(|t| t.is_active()).cloned().collect();
            active.sort_by_key(|t| t.position);
            Ok(active)
        })
    }
}
