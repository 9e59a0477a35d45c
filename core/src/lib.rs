//! # KwikOut Core
//!
//! Core traits and types for the KwikOut exit queue.
//!
//! Drivers waiting to leave a car park join a per-zone FIFO queue, are promoted
//! one at a time to `Current`, and either exit or cancel. This crate holds the
//! pieces every other crate agrees on:
//!
//! - [`ticket`]: `Ticket`, `TicketId`, `UserId`, `Zone`, `TicketState`, `QueueStatus`
//! - [`error`]: the `QueueError` taxonomy
//! - [`store`]: the `QueueStore` trait (atomic position assignment and advancement)
//! - [`notification`]: the `NotificationPort` trait (best-effort "your turn" signal)
//! - [`environment`]: injected dependencies such as the clock
//!
//! There is no I/O here. Storage lives in `kwikout-postgres` and
//! `kwikout-testing`; orchestration lives in `kwikout-runtime`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod notification;
pub mod store;
pub mod ticket;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{QueueError, Result};
pub use notification::{NotificationError, NotificationPort};
pub use store::{QueueStore, StoreFuture};
pub use ticket::{QueueStatus, Ticket, TicketId, TicketState, UserId, Zone};

/// Environment traits - dependencies injected into stores and services.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use kwikout_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
