//! Grant-to-record pipeline: allocator, queue, worker and dead-lettering.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::World;
use coupon_rush_core::issuance::IssuanceRepository;
use coupon_rush_core::queue::IssuanceQueue;
use coupon_rush_core::types::{CouponId, UserId};
use coupon_rush_runtime::{IssuanceWorker, RetryPolicy, WorkerConfig};
use std::collections::HashSet;
use std::time::Duration;

const COUPON: CouponId = CouponId::new(3);

fn worker(world: &World, max_attempts: u32) -> IssuanceWorker {
    IssuanceWorker::new(
        world.providers(),
        WorkerConfig {
            batch_size: 50,
            poll_interval: Duration::from_millis(10),
            retry: RetryPolicy::builder()
                .max_attempts(max_attempts)
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(60))
                .build(),
        },
    )
}

#[tokio::test]
async fn every_grant_becomes_one_record() {
    let world = World::limited(COUPON, 20).await;
    let allocator = world.allocator();
    for user in 0..30 {
        allocator.allocate(UserId::new(user), COUPON).await.unwrap();
    }
    // replay the first ten users
    for user in 0..10 {
        allocator.allocate(UserId::new(user), COUPON).await.unwrap();
    }

    let report = worker(&world, 5).drain_once().await;
    assert_eq!(report.persisted, 20);
    assert_eq!(world.issuances.count_for_coupon(COUPON).await.unwrap(), 20);

    let users: HashSet<_> = world.issuances.records().iter().map(|r| r.user_id).collect();
    assert_eq!(users.len(), 20);
}

#[tokio::test]
async fn transient_failures_converge() {
    let world = World::limited(COUPON, 10).await;
    let allocator = world.allocator();
    for user in 0..10 {
        allocator.allocate(UserId::new(user), COUPON).await.unwrap();
    }
    world.issuances.faults().fail_next(4);

    let worker = worker(&world, 5);
    for _ in 0..8 {
        worker.drain_once().await;
        world.clock.advance(chrono::Duration::minutes(2));
    }

    assert_eq!(world.issuances.len(), 10);
    assert_eq!(world.queue.queue_size().await.unwrap(), 0);
    assert_eq!(world.queue.retry_size().await.unwrap(), 0);
    assert!(world.dead_letters.entries().is_empty());
}

#[tokio::test]
async fn persistent_failure_dead_letters_after_max_attempts() {
    let world = World::limited(COUPON, 2).await;
    let allocator = world.allocator();
    allocator.allocate(UserId::new(1), COUPON).await.unwrap();
    allocator.allocate(UserId::new(2), COUPON).await.unwrap();
    world.issuances.faults().set_unavailable(true);

    let worker = worker(&world, 3);
    for _ in 0..5 {
        worker.drain_once().await;
        world.clock.advance(chrono::Duration::minutes(2));
    }

    let dead = world.dead_letters.entries();
    assert_eq!(dead.len(), 2);
    assert!(dead.iter().all(|d| d.entry.attempt_count == 3));
    assert!(dead.iter().all(|d| d.error_message.contains("injected outage")));
    assert_eq!(world.queue.retry_size().await.unwrap(), 0);
    assert!(world.issuances.is_empty());
}

#[tokio::test]
async fn requeued_entries_are_persisted_on_next_drain() {
    let world = World::limited(COUPON, 3).await;
    let allocator = world.allocator();
    for user in 0..3 {
        allocator.allocate(UserId::new(user), COUPON).await.unwrap();
    }
    world.issuances.faults().fail_next(3);

    let worker = worker(&world, 5);
    worker.drain_once().await;
    assert_eq!(world.queue.retry_size().await.unwrap(), 3);

    // deadlines are in the future; an operator requeue makes them due now
    assert_eq!(world.queue.requeue_retry(1000).await.unwrap(), 3);
    let report = worker.drain_once().await;
    assert_eq!(report.persisted, 3);
    assert_eq!(world.issuances.len(), 3);
}
