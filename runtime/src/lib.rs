//! # KwikOut Runtime
//!
//! Orchestration for the KwikOut exit queue.
//!
//! - [`QueueService`]: join, status, advance, complete, cancel and logout over
//!   any `QueueStore`, announcing promotions through a `NotificationPort`
//! - [`LoggingNotifier`]: the default port
//! - [`Config`]: environment-driven settings
//! - [`bootstrap::connect`]: a ready `PostgreSQL`-backed service
//!
//! ## Example
//!
//! ```no_run
//! use kwikout_core::ticket::{UserId, Zone};
//! use kwikout_runtime::{Config, bootstrap};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = bootstrap::connect(&Config::from_env()).await?;
//!     let ticket = service.join(UserId::parse("driver-42")?, Zone::A).await?;
//!     let status = service.status(ticket.id).await?;
//!     println!("place in line: {:?}", status.place());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod notifier;
pub mod service;
pub mod telemetry;

pub use config::{Config, PostgresConfig, QueueConfig};
pub use notifier::LoggingNotifier;
pub use service::{Advanced, QueueService};
