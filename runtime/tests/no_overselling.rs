//! Concurrency properties of slot allocation against the in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::World;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::inventory::CouponInventory;
use coupon_rush_core::queue::IssuanceQueue;
use coupon_rush_core::types::{AllocationOutcome, AllocationPath, CouponId, UserId};
use coupon_rush_runtime::reconciliation::{ReconciliationConfig, ReconciliationJob};
use coupon_rush_runtime::SlotAllocator;
use coupon_rush_testing::properties::oversubscribed;
use proptest::prelude::*;
use std::sync::Arc;

const COUPON: CouponId = CouponId::new(42);

/// Fire `requests` allocations for distinct users at once.
async fn burst(allocator: &Arc<SlotAllocator>, requests: usize) -> Vec<AllocationOutcome> {
    let handles: Vec<_> = (0..requests)
        .map(|user| {
            let allocator = Arc::clone(allocator);
            tokio::spawn(async move {
                allocator
                    .allocate(UserId::new(i64::try_from(user).unwrap()), COUPON)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(requests);
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    outcomes
}

fn granted(outcomes: &[AllocationOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_issued()).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_slots_thousand_requests() {
    let world = World::limited(COUPON, 100).await;
    let outcomes = burst(&world.allocator(), 1000).await;

    assert_eq!(granted(&outcomes), 100);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, AllocationOutcome::SoldOut { .. }))
            .count(),
        900
    );
    assert_eq!(world.available(COUPON), 0);
    assert_eq!(world.queue.queue_size().await.unwrap(), 100);
    assert_eq!(world.inventory.locked_consumes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fallback_alone_keeps_the_cap() {
    let world = World::limited(COUPON, 100).await;
    world.counter.faults().set_unavailable(true);
    let outcomes = burst(&world.allocator(), 1000).await;

    assert_eq!(granted(&outcomes), 100);
    assert!(outcomes.iter().all(|o| match o {
        AllocationOutcome::Issued { path } | AllocationOutcome::SoldOut { path } => {
            *path == AllocationPath::Fallback
        }
        AllocationOutcome::Duplicate => false,
    }));
    assert_eq!(world.available(COUPON), 0);
    assert_eq!(world.inventory.locked_consumes(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn flapping_counter_never_oversells() {
    let world = World::limited(COUPON, 50).await;
    world.counter.faults().fail_next(30);
    let outcomes = burst(&world.allocator(), 400).await;

    assert_eq!(granted(&outcomes), 50);
    assert_eq!(world.available(COUPON), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replayed_requests_are_issued_once() {
    let world = World::limited(COUPON, 10).await;
    let allocator = world.allocator();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.allocate(UserId::new(7), COUPON).await.unwrap() })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(granted(&outcomes), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == AllocationOutcome::Duplicate)
            .count(),
        49
    );
    assert_eq!(world.available(COUPON), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resync_gates_on_durable_value() {
    let world = World::limited(COUPON, 50).await;
    let mut inventory: CouponInventory = world.inventory.snapshot(COUPON).unwrap();
    inventory.available_today = 30;
    world.inventory.insert(inventory);
    world.counter.set(COUPON, 50).await.unwrap();

    let job = ReconciliationJob::new(world.providers(), ReconciliationConfig::default());
    assert_eq!(job.resync_fast_path_counter(COUPON).await.unwrap(), Some(30));

    let outcomes = burst(&world.allocator(), 60).await;
    assert_eq!(granted(&outcomes), 30);
    assert_eq!(world.available(COUPON), 0);
    // every denial came from the counter, none from durable drift
    assert_eq!(world.counter.value(COUPON), Some(-30));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn grants_never_exceed_capacity((capacity, requests) in oversubscribed(), counter_down in any::<bool>()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (grants, available) = runtime.block_on(async {
            let world = World::limited(COUPON, capacity).await;
            world.counter.faults().set_unavailable(counter_down);
            let outcomes = burst(&world.allocator(), requests).await;
            (granted(&outcomes), world.available(COUPON))
        });

        prop_assert_eq!(grants, usize::try_from(capacity).unwrap());
        prop_assert_eq!(available, 0);
    }

    #[test]
    fn durable_availability_stays_in_bounds(
        capacity in 1..20i32,
        requests in 0..60usize,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let available = runtime.block_on(async {
            let world = World::limited(COUPON, capacity).await;
            burst(&world.allocator(), requests).await;
            world.available(COUPON)
        });

        prop_assert!(available >= 0);
        prop_assert!(available <= capacity);
        let expected = capacity - i32::try_from(requests.min(usize::try_from(capacity).unwrap())).unwrap();
        prop_assert_eq!(available, expected);
    }
}
