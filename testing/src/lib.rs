//! # KwikOut Testing
//!
//! Testing utilities and helpers for the KwikOut exit queue.
//!
//! This crate provides:
//! - [`InMemoryQueueStore`]: a `QueueStore` with the same contract as the
//!   PostgreSQL store, minus the database
//! - [`RecordingNotifier`]: a scriptable `NotificationPort`
//! - [`FixedClock`]: deterministic time
//! - [`properties`]: proptest strategies for queue operation sequences
//!
//! ## Example
//!
//! ```
//! use kwikout_testing::{InMemoryQueueStore, RecordingNotifier, test_clock};
//! use std::sync::Arc;
//!
//! let store = InMemoryQueueStore::with_clock(Arc::new(test_clock()));
//! let notifier = RecordingNotifier::new();
//! # let _ = (store, notifier);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod notifier;
pub mod store;

use chrono::{DateTime, Utc};
use kwikout_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use kwikout_testing::mocks::FixedClock;
    /// use kwikout_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use kwikout_core::ticket::{Ticket, UserId};

    /// Route `tracing` output through the test harness.
    ///
    /// Safe to call from every test; only the first call installs a subscriber.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kwikout=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }

    /// Numbered user identifier (`user-7`) for table-driven tests.
    #[must_use]
    pub fn user(n: usize) -> UserId {
        UserId::new(format!("user-{n}"))
    }

    /// Positions of `tickets`, sorted ascending.
    #[must_use]
    pub fn sorted_positions(tickets: &[Ticket]) -> Vec<u32> {
        let mut positions: Vec<u32> = tickets.iter().map(|t| t.position).collect();
        positions.sort_unstable();
        positions
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use kwikout_core::ticket::Zone;
    use proptest::prelude::*;

    /// One call a client of the queue service can make.
    ///
    /// Users are small integers so generated sequences collide often.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum QueueOp {
        /// `join(user, zone)`
        Join {
            /// Numbered user
            user: usize,
            /// Target zone
            zone: Zone,
        },
        /// `advance(zone)`
        Advance(Zone),
        /// `complete` the user's active ticket
        Complete {
            /// Numbered user
            user: usize,
        },
        /// `cancel` the user's active ticket
        Cancel {
            /// Numbered user
            user: usize,
        },
        /// `logout(user)`
        Logout {
            /// Numbered user
            user: usize,
        },
    }

    /// Any zone.
    pub fn arb_zone() -> impl Strategy<Value = Zone> {
        prop_oneof![Just(Zone::A), Just(Zone::B), Just(Zone::C)]
    }

    /// A single operation over `users` distinct users.
    ///
    /// Joins and advances dominate so queues actually build up.
    pub fn arb_queue_op(users: usize) -> impl Strategy<Value = QueueOp> {
        let users = users.max(1);
        prop_oneof![
            4 => (0..users, arb_zone()).prop_map(|(user, zone)| QueueOp::Join { user, zone }),
            3 => arb_zone().prop_map(QueueOp::Advance),
            2 => (0..users).prop_map(|user| QueueOp::Complete { user }),
            1 => (0..users).prop_map(|user| QueueOp::Cancel { user }),
            1 => (0..users).prop_map(|user| QueueOp::Logout { user }),
        ]
    }

    /// A sequence of up to `max_len` operations.
    pub fn arb_queue_ops(users: usize, max_len: usize) -> impl Strategy<Value = Vec<QueueOp>> {
        prop::collection::vec(arb_queue_op(users), 0..max_len)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use notifier::RecordingNotifier;
pub use store::{InMemoryQueueStore, ZoneHold};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn user_helper_is_stable() {
        assert_eq!(helpers::user(3).as_str(), "user-3");
    }
}
