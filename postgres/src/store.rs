//! `PostgreSQL` queue store.
//!
//! Every mutation is one transaction that starts by locking the zone's row in
//! `queue_zones` with `SELECT ... FOR UPDATE`. That lock is the per-zone
//! serialization point: a second writer for the same zone blocks until the
//! first commits, then reads the committed max position (READ COMMITTED takes a
//! fresh snapshot per statement). Writers for different zones never wait on
//! each other.
//!
//! The wait is bounded by a transaction-local `lock_timeout`; a timeout, a
//! deadlock, or a unique-index violation re-runs the whole transaction under
//! the store's [`RetryPolicy`].

use crate::retry::{AttemptError, RetryPolicy, with_retry};
use kwikout_core::error::QueueError;
use kwikout_core::store::{QueueStore, StoreFuture};
use kwikout_core::ticket::{QueueStatus, Ticket, TicketId, TicketState, UserId, Zone};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// Default bound on how long a transaction waits for a zone lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

const TICKET_COLUMNS: &str =
    "id, user_id, zone, position, state, created_at, updated_at, notified_at";

/// Smallest lock wait the store will ask for; `0` means "wait forever" to `PostgreSQL`.
const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// `lock_timeout` setting for `timeout`, never the unbounded `0`.
fn lock_timeout_setting(timeout: Duration) -> String {
    format!("{}ms", timeout.max(MIN_LOCK_TIMEOUT).as_millis())
}

/// `PostgreSQL`-backed [`QueueStore`].
///
/// # Example
///
/// ```no_run
/// use kwikout_postgres::{PostgresQueueStore, RetryPolicy};
/// use kwikout_core::store::QueueStore;
/// use kwikout_core::ticket::{UserId, Zone};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresQueueStore::from_pool(pool)
///     .with_retry_policy(RetryPolicy::builder().max_retries(3).build());
/// store.migrate().await?;
///
/// let ticket = store.insert(UserId::new("driver-1"), Zone::A).await?;
/// println!("queued at position {}", ticket.position);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresQueueStore {
    pool: PgPool,
    retry: RetryPolicy,
    lock_timeout: Duration,
}

impl PostgresQueueStore {
    /// Connect to `database_url` with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, QueueError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| QueueError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Replace the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the zone lock wait bound.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Begin a transaction and take the zone lock.
    async fn lock_zone(&self, zone: Zone) -> Result<Transaction<'static, Postgres>, AttemptError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(self.lock_timeout))
            .execute(&mut *tx)
            .await?;

        let locked = sqlx::query("SELECT zone FROM queue_zones WHERE zone = $1 FOR UPDATE")
            .bind(zone.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            return Err(QueueError::UnknownZone(zone.to_string()).into());
        }
        Ok(tx)
    }

    /// Zone of a ticket. Zones are immutable, so no lock is needed.
    async fn zone_of(&self, ticket_id: TicketId) -> Result<Zone, QueueError> {
        let zone: Option<String> = sqlx::query_scalar("SELECT zone FROM queue_tickets WHERE id = $1")
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        zone.map_or_else(
            || Err(QueueError::ticket_not_found(ticket_id)),
            |zone| Zone::parse(&zone),
        )
    }

    async fn try_insert(&self, user_id: &UserId, zone: Zone) -> Result<Ticket, AttemptError> {
        let mut tx = self.lock_zone(zone).await?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r"
            SELECT id FROM queue_tickets
            WHERE user_id = $1 AND state IN ('waiting', 'current')
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            return Err(QueueError::DuplicateActiveTicket {
                user_id: user_id.clone(),
                existing: TicketId::from_uuid(existing),
            }
            .into());
        }

        let position: i32 = sqlx::query_scalar(
            r"
            SELECT COALESCE(MAX(position), 0) + 1
            FROM queue_tickets
            WHERE zone = $1 AND state IN ('waiting', 'current')
            ",
        )
        .bind(zone.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            r"
            INSERT INTO queue_tickets (id, user_id, zone, position, state)
            VALUES ($1, $2, $3, $4, 'waiting')
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(user_id.as_str())
        .bind(zone.as_str())
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;

        let ticket = row_to_ticket(&row)?;
        tx.commit().await?;
        Ok(ticket)
    }

    async fn try_mark_current(&self, zone: Zone) -> Result<Option<Ticket>, AttemptError> {
        let mut tx = self.lock_zone(zone).await?;

        let row = sqlx::query(&format!(
            r"
            UPDATE queue_tickets
            SET state = 'current', updated_at = now()
            WHERE id = (
                SELECT id FROM queue_tickets
                WHERE zone = $1 AND state = 'waiting'
                ORDER BY position ASC
                LIMIT 1
            )
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(zone.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let promoted = row.as_ref().map(row_to_ticket).transpose()?;
        tx.commit().await?;
        Ok(promoted)
    }

    /// Load a ticket inside a zone transaction, locking its row.
    async fn lock_ticket(
        tx: &mut Transaction<'static, Postgres>,
        ticket_id: TicketId,
    ) -> Result<Ticket, AttemptError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM queue_tickets WHERE id = $1 FOR UPDATE"
        ))
        .bind(ticket_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

        Ok(row_to_ticket(&row)?)
    }

    async fn try_mark_notified(&self, ticket_id: TicketId, zone: Zone) -> Result<Ticket, AttemptError> {
        let mut tx = self.lock_zone(zone).await?;
        let mut ticket = Self::lock_ticket(&mut tx, ticket_id).await?;

        // Validates the state; the stored timestamp comes from the database
        ticket.mark_notified(ticket.updated_at)?;

        let row = sqlx::query(&format!(
            r"
            UPDATE queue_tickets
            SET notified_at = now()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(ticket_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let ticket = row_to_ticket(&row)?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// Move a ticket to `next` under the zone lock.
    ///
    /// With `idempotent_when_terminal`, a terminal ticket is returned as-is and
    /// the transaction is rolled back without writing.
    async fn try_transition(
        &self,
        ticket_id: TicketId,
        zone: Zone,
        next: TicketState,
        idempotent_when_terminal: bool,
    ) -> Result<Ticket, AttemptError> {
        let mut tx = self.lock_zone(zone).await?;
        let mut ticket = Self::lock_ticket(&mut tx, ticket_id).await?;

        if idempotent_when_terminal && ticket.state.is_terminal() {
            tx.rollback().await?;
            return Ok(ticket);
        }

        // Validates the edge; the stored timestamp comes from the database
        ticket.transition(next, ticket.updated_at)?;

        let row = sqlx::query(&format!(
            r"
            UPDATE queue_tickets
            SET state = $2, updated_at = now()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(ticket_id.as_uuid())
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let ticket = row_to_ticket(&row)?;
        tx.commit().await?;
        Ok(ticket)
    }
}

fn database_error(error: sqlx::Error) -> QueueError {
    QueueError::Database(error.to_string())
}

/// Convert a database row to a `Ticket`.
fn row_to_ticket(row: &PgRow) -> Result<Ticket, QueueError> {
    let id: Uuid = row.try_get("id").map_err(database_error)?;
    let user_id: String = row.try_get("user_id").map_err(database_error)?;
    let zone: String = row.try_get("zone").map_err(database_error)?;
    let position: i32 = row.try_get("position").map_err(database_error)?;
    let state: String = row.try_get("state").map_err(database_error)?;

    Ok(Ticket {
        id: TicketId::from_uuid(id),
        user_id: UserId::new(user_id),
        zone: Zone::parse(&zone)?,
        position: u32::try_from(position)
            .map_err(|_| QueueError::Database(format!("Invalid position: {position}")))?,
        state: TicketState::parse(&state)?,
        created_at: row.try_get("created_at").map_err(database_error)?,
        updated_at: row.try_get("updated_at").map_err(database_error)?,
        notified_at: row.try_get("notified_at").map_err(database_error)?,
    })
}

impl QueueStore for PostgresQueueStore {
    fn insert(&self, user_id: UserId, zone: Zone) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let ticket =
                with_retry(&self.retry, zone, "insert", || self.try_insert(&user_id, zone)).await?;

            tracing::debug!(
                ticket_id = %ticket.id,
                zone = %zone,
                position = ticket.position,
                "Ticket inserted"
            );
            Ok(ticket)
        })
    }

    fn mark_current(&self, zone: Zone) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            with_retry(&self.retry, zone, "mark_current", || self.try_mark_current(zone)).await
        })
    }

    fn mark_notified(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id).await?;
            with_retry(&self.retry, zone, "mark_notified", || {
                self.try_mark_notified(ticket_id, zone)
            })
            .await
        })
    }

    fn complete(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id).await?;
            with_retry(&self.retry, zone, "complete", || {
                self.try_transition(ticket_id, zone, TicketState::Exited, false)
            })
            .await
        })
    }

    fn cancel(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let zone = self.zone_of(ticket_id).await?;
            with_retry(&self.retry, zone, "cancel", || {
                self.try_transition(ticket_id, zone, TicketState::Cancelled, true)
            })
            .await
        })
    }

    fn get(&self, user_id: UserId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                r"
                SELECT {TICKET_COLUMNS} FROM queue_tickets
                WHERE user_id = $1 AND state IN ('waiting', 'current')
                "
            ))
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

            row.as_ref().map(row_to_ticket).transpose()
        })
    }

    fn ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM queue_tickets WHERE id = $1"
            ))
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            row_to_ticket(&row)
        })
    }

    fn status(&self, ticket_id: TicketId) -> StoreFuture<'_, QueueStatus> {
        Box::pin(async move {
            // One statement, one snapshot: the ticket and its count agree
            let row = sqlx::query(
                r"
                SELECT t.id, t.user_id, t.zone, t.position, t.state, t.created_at, t.updated_at,
                    t.notified_at,
                    CASE WHEN t.state IN ('waiting', 'current') THEN (
                        SELECT COUNT(*) FROM queue_tickets a
                        WHERE a.zone = t.zone
                          AND a.state IN ('waiting', 'current')
                          AND a.position < t.position
                    ) ELSE 0 END AS ahead
                FROM queue_tickets t
                WHERE t.id = $1
                ",
            )
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .ok_or_else(|| QueueError::ticket_not_found(ticket_id))?;

            let ahead: i64 = row.try_get("ahead").map_err(database_error)?;
            Ok(QueueStatus {
                ticket: row_to_ticket(&row)?,
                ahead: u32::try_from(ahead).unwrap_or(u32::MAX),
            })
        })
    }

    fn active(&self, zone: Zone) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {TICKET_COLUMNS} FROM queue_tickets
                WHERE zone = $1 AND state IN ('waiting', 'current')
                ORDER BY position ASC
                "
            ))
            .bind(zone.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            rows.iter().map(row_to_ticket).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_setting_is_in_milliseconds() {
        assert_eq!(lock_timeout_setting(Duration::from_secs(2)), "2000ms");
        assert_eq!(lock_timeout_setting(DEFAULT_LOCK_TIMEOUT), "2000ms");
    }

    #[test]
    fn zero_lock_timeout_stays_bounded() {
        assert_eq!(lock_timeout_setting(Duration::ZERO), "1ms");
        assert_eq!(lock_timeout_setting(Duration::from_micros(300)), "1ms");
    }
}
