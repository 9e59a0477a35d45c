//! Wiring a production [`QueueService`] from [`Config`].

use crate::config::Config;
use crate::notifier::LoggingNotifier;
use crate::service::QueueService;
use kwikout_core::error::QueueError;
use kwikout_postgres::PostgresQueueStore;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use thiserror::Error;

/// Production service: `PostgreSQL` storage, log-only notifications.
pub type PostgresQueueService = QueueService<PostgresQueueStore, LoggingNotifier>;

/// Startup failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Could not open the connection pool.
    #[error("Failed to connect to PostgreSQL: {0}")]
    Connect(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Failed to run migrations: {0}")]
    Migrate(QueueError),
}

/// Connect to `PostgreSQL`, apply migrations and build the service.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the pool cannot connect or migrations fail.
pub async fn connect(config: &Config) -> Result<PostgresQueueService, BootstrapError> {
    tracing::info!(
        max_connections = config.postgres.max_connections,
        min_connections = config.postgres.min_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await?;

    let store = PostgresQueueStore::from_pool(pool)
        .with_retry_policy(config.queue.retry_policy())
        .with_lock_timeout(config.queue.lock_timeout());

    store.migrate().await.map_err(BootstrapError::Migrate)?;
    tracing::info!("Migrations applied");

    Ok(QueueService::new(store, LoggingNotifier))
}
