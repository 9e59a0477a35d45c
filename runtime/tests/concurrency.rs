//! Concurrent joins and advances on one zone.
//!
//! Each test spawns its callers onto a multi-threaded runtime so they really
//! race for the zone, and repeats the run to vary the interleaving.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::future::join_all;
use kwikout_core::error::QueueError;
use kwikout_core::ticket::{TicketState, Zone};
use kwikout_runtime::QueueService;
use kwikout_testing::helpers::{init_test_tracing, sorted_positions, user};
use kwikout_testing::{InMemoryQueueStore, RecordingNotifier};
use std::collections::HashSet;
use std::sync::Arc;

const DRIVERS: usize = 50;
const ROUNDS: usize = 20;

fn service() -> Arc<QueueService<InMemoryQueueStore, RecordingNotifier>> {
    Arc::new(QueueService::new(
        InMemoryQueueStore::new(),
        RecordingNotifier::new(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_joins_fill_positions_one_to_fifty() {
    init_test_tracing();

    for _ in 0..ROUNDS {
        let service = service();

        let joins = (0..DRIVERS).map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.join(user(n), Zone::A).await })
        });
        let tickets: Vec<_> = join_all(joins)
            .await
            .into_iter()
            .map(|joined| joined.expect("join task panicked").expect("join failed"))
            .collect();

        let expected: Vec<u32> = (1..=50).collect();
        assert_eq!(sorted_positions(&tickets), expected);
        assert_eq!(
            sorted_positions(&service.snapshot(Zone::A).await.unwrap()),
            expected
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_advances_promote_each_driver_once_in_order() {
    init_test_tracing();

    for _ in 0..ROUNDS {
        let service = service();
        for n in 0..DRIVERS {
            service.join(user(n), Zone::B).await.unwrap();
        }

        let advances = (0..DRIVERS + 5).map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.advance(Zone::B).await })
        });
        let promoted: Vec<u32> = join_all(advances)
            .await
            .into_iter()
            .filter_map(|advanced| advanced.expect("advance task panicked").expect("advance failed"))
            .map(|advanced| advanced.ticket.position)
            .collect();

        let unique: HashSet<u32> = promoted.iter().copied().collect();
        assert_eq!(promoted.len(), DRIVERS, "extra advances find nobody waiting");
        assert_eq!(unique.len(), DRIVERS, "no ticket is promoted twice");

        let snapshot = service.snapshot(Zone::B).await.unwrap();
        assert!(snapshot.iter().all(|t| t.state == TicketState::Current));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn joins_racing_cancels_never_reuse_an_active_position() {
    init_test_tracing();

    for _ in 0..ROUNDS {
        let service = service();
        let early: Vec<_> = {
            let mut early = Vec::new();
            for n in 0..10 {
                early.push(service.join(user(n), Zone::C).await.unwrap());
            }
            early
        };

        let cancels = early.iter().step_by(2).map(|ticket| {
            let service = Arc::clone(&service);
            let id = ticket.id;
            tokio::spawn(async move { service.cancel(id).await.map(|_| ()) })
        });
        let joins = (10..30).map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.join(user(n), Zone::C).await.map(|_| ()) })
        });
        let tasks: Vec<_> = cancels.chain(joins).collect();
        for result in join_all(tasks).await {
            result.expect("task panicked").expect("operation failed");
        }

        let positions = sorted_positions(&service.snapshot(Zone::C).await.unwrap());
        let unique: HashSet<u32> = positions.iter().copied().collect();
        assert_eq!(positions.len(), 25);
        assert_eq!(unique.len(), positions.len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn same_user_racing_into_every_zone_gets_one_ticket() {
    init_test_tracing();

    for _ in 0..ROUNDS {
        let service = service();

        let joins = Zone::ALL.map(|zone| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.join(user(0), zone).await })
        });
        let results: Vec<_> = join_all(joins)
            .await
            .into_iter()
            .map(|joined| joined.expect("join task panicked"))
            .collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one zone accepts the user");
        let winner = winners[0];

        for result in &results {
            if let Err(error) = result {
                assert_eq!(
                    error,
                    &QueueError::DuplicateActiveTicket {
                        user_id: user(0),
                        existing: winner.id,
                    }
                );
            }
        }

        let active: usize = {
            let mut total = 0;
            for zone in Zone::ALL {
                total += service.snapshot(zone).await.unwrap().len();
            }
            total
        };
        assert_eq!(active, 1);
    }
}
