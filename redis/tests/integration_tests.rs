//! Integration tests for the `Redis` adapters using testcontainers.
//!
//! Docker must be running; the tests are ignored by default:
//!
//! ```text
//! cargo test -p coupon-rush-redis -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, TimeZone, Utc};
use coupon_rush_core::claims::ClaimRegistry;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::error::CounterError;
use coupon_rush_core::queue::{IssuanceQueue, IssuanceQueueEntry};
use coupon_rush_core::types::{CouponId, UserId};
use coupon_rush_redis::{RedisClaimRegistry, RedisIssuanceQueue, RedisSlotCounter, connect, ping};
use coupon_rush_redis::queue::ISSUE_QUEUE_KEY;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn setup() -> (ContainerAsync<Redis>, ConnectionManager) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    let manager = connect(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("Failed to connect to redis");
    ping(&manager).await.expect("redis should answer PING");
    (container, manager)
}

fn entry(user: i64) -> IssuanceQueueEntry {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    IssuanceQueueEntry::new(CouponId::new(1), UserId::new(user), at, at + Duration::days(30))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn counter_grants_exactly_the_seeded_value() {
    let (_container, manager) = setup().await;
    let counter = Arc::new(RedisSlotCounter::new(manager));
    let coupon = CouponId::new(1);
    counter.set(coupon, 100).await.unwrap();

    let handles: Vec<_> = (0..1000)
        .map(|_| {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move { counter.decrement(coupon).await.unwrap() })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() >= 0 {
            granted += 1;
        }
    }
    assert_eq!(granted, 100);
    assert_eq!(counter.get(coupon).await.unwrap(), Some(-900));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn missing_counter_is_unseeded_not_negative() {
    let (_container, manager) = setup().await;
    let counter = RedisSlotCounter::new(manager);
    let coupon = CouponId::new(2);

    assert_eq!(
        counter.decrement(coupon).await.unwrap_err(),
        CounterError::Unseeded(coupon)
    );
    assert_eq!(counter.get(coupon).await.unwrap(), None);

    counter.set(coupon, 0).await.unwrap();
    assert_eq!(counter.decrement(coupon).await.unwrap(), -1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn queues_are_fifo_and_requeue_clears_deadline() {
    let (_container, manager) = setup().await;
    let queue = RedisIssuanceQueue::new(manager);

    queue.enqueue(entry(1)).await.unwrap();
    queue.enqueue(entry(2)).await.unwrap();
    assert_eq!(queue.poll().await.unwrap().unwrap().user_id, UserId::new(1));

    for user in 10..13 {
        let mut e = entry(user);
        e.record_failure("timeout", e.requested_at + Duration::hours(1));
        queue.enqueue_retry(e).await.unwrap();
    }
    assert_eq!(queue.retry_size().await.unwrap(), 3);

    assert_eq!(queue.requeue_retry(2).await.unwrap(), 2);
    assert_eq!(queue.queue_size().await.unwrap(), 3);
    assert_eq!(queue.retry_size().await.unwrap(), 1);

    // remaining main entries: user 2, then the two requeued in retry order
    assert_eq!(queue.poll().await.unwrap().unwrap().user_id, UserId::new(2));
    let requeued = queue.poll().await.unwrap().unwrap();
    assert_eq!(requeued.user_id, UserId::new(10));
    assert!(requeued.not_before.is_none());
    assert_eq!(requeued.attempt_count, 1);

    queue.clear_retry().await.unwrap();
    assert_eq!(queue.retry_size().await.unwrap(), 0);
    assert!(queue.poll_retry().await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn undecodable_entry_is_dropped_on_poll() {
    let (_container, mut manager) = setup().await;
    let queue = RedisIssuanceQueue::new(manager.clone());

    queue.enqueue(entry(1)).await.unwrap();
    let _: () = manager.lpush(ISSUE_QUEUE_KEY, "not json").await.unwrap();
    queue.enqueue(entry(2)).await.unwrap();

    assert_eq!(queue.poll().await.unwrap().unwrap().user_id, UserId::new(1));
    assert!(queue.poll().await.is_err());
    assert_eq!(queue.queue_size().await.unwrap(), 1);
    assert_eq!(queue.poll().await.unwrap().unwrap().user_id, UserId::new(2));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn claims_are_atomic_per_user() {
    let (_container, manager) = setup().await;
    let claims = RedisClaimRegistry::new(manager);
    let coupon = CouponId::new(5);

    assert!(claims.claim(UserId::new(1), coupon).await.unwrap());
    assert!(!claims.claim(UserId::new(1), coupon).await.unwrap());
    assert!(claims.claim(UserId::new(2), coupon).await.unwrap());

    claims.release(UserId::new(1), coupon).await.unwrap();
    assert!(claims.claim(UserId::new(1), coupon).await.unwrap());
}
