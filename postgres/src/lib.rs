//! `PostgreSQL` queue store for KwikOut.
//!
//! This crate provides the durable implementation of the `QueueStore` trait
//! from `kwikout-core`. It uses sqlx and supports:
//!
//! - Race-free position assignment (per-zone row lock around max-read + insert)
//! - Partial unique indexes backing "one active ticket per user" and
//!   "one active ticket per zone position"
//! - Bounded lock waits and conflict retries, surfacing `Contention`
//! - Embedded migrations
//!
//! # Example
//!
//! ```no_run
//! use kwikout_postgres::PostgresQueueStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresQueueStore::new("postgres://localhost/kwikout").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod retry;
pub mod store;

pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use store::{DEFAULT_LOCK_TIMEOUT, PostgresQueueStore};
