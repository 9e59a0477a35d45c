//! Bounded retry of conflicting zone transactions.
//!
//! A zone transaction can lose to a concurrent writer in a few ways: the zone
//! row lock is not granted within `lock_timeout`, PostgreSQL aborts the
//! transaction as a deadlock or serialization victim, or a partial unique
//! index rejects the write. All of these leave nothing behind, so the whole
//! transaction is re-run after an exponential backoff. Once the budget is
//! spent the caller gets [`QueueError::Contention`] instead of waiting forever.

use kwikout_core::error::QueueError;
use kwikout_core::ticket::Zone;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// SQLSTATE codes that mean "another writer got there first; try again".
const CONFLICT_CODES: [&str; 4] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available (lock_timeout expired)
    "23505", // unique_violation on an active-ticket index
];

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `initial_delay`: 10ms
/// - `max_delay`: 500ms
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = `initial_delay` * (multiplier ^ attempt),
    /// capped at `max_delay`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap_ms = self.max_delay.as_millis() as f64;

        // `as` saturates, so an infinite product lands on the cap below
        Duration::from_millis(delay_ms.min(cap_ms) as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Outcome of one transaction attempt.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Lost to a concurrent writer; safe to re-run.
    Conflict(String),
    /// Anything else; surfaced as-is.
    Fatal(QueueError),
}

impl From<QueueError> for AttemptError {
    fn from(error: QueueError) -> Self {
        Self::Fatal(error)
    }
}

impl From<sqlx::Error> for AttemptError {
    fn from(error: sqlx::Error) -> Self {
        if is_conflict(&error) {
            Self::Conflict(error.to_string())
        } else {
            Self::Fatal(QueueError::Database(error.to_string()))
        }
    }
}

/// Whether `error` is a transient conflict with another writer.
pub(crate) fn is_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| CONFLICT_CODES.iter().any(|c| *c == &*code)),
        _ => false,
    }
}

/// Run `attempt` until it commits, fails fatally, or the retry budget is spent.
///
/// # Errors
///
/// Returns the attempt's fatal error unchanged, or [`QueueError::Contention`]
/// after `policy.max_retries` conflicting re-runs.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    zone: Zone,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut retries = 0;

    loop {
        match attempt().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(
                        operation,
                        zone = %zone,
                        retries,
                        "Zone transaction committed after retry"
                    );
                }
                return Ok(value);
            }
            Err(AttemptError::Fatal(error)) => return Err(error),
            Err(AttemptError::Conflict(reason)) => {
                if retries >= policy.max_retries {
                    tracing::error!(
                        operation,
                        zone = %zone,
                        attempts = retries + 1,
                        reason = %reason,
                        "Zone transaction gave up after max retries"
                    );
                    metrics::counter!("queue.store.contention", "zone" => zone.as_str())
                        .increment(1);
                    return Err(QueueError::Contention {
                        zone,
                        attempts: retries + 1,
                    });
                }

                let delay = policy.delay_for_attempt(retries);
                tracing::warn!(
                    operation,
                    zone = %zone,
                    retry = retries + 1,
                    delay_ms = delay.as_millis(),
                    reason = %reason,
                    "Zone transaction conflicted, retrying"
                );
                metrics::counter!("queue.store.retries", "zone" => zone.as_str()).increment(1);

                sleep(delay).await;
                retries += 1;
            }
        }
    }
}
