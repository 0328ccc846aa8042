//! Shared fixtures for runtime integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::environment::Clock;
use coupon_rush_core::inventory::InventoryStore;
use coupon_rush_core::types::CouponId;
use coupon_rush_runtime::{AllocatorConfig, Providers, SlotAllocator};
use coupon_rush_testing::mocks::FixedClock;
use coupon_rush_testing::{
    InMemoryClaimRegistry, InMemoryDeadLetterSink, InMemoryInventoryStore,
    InMemoryIssuanceQueue, InMemoryIssuanceRepository, InMemorySlotCounter, test_clock,
};
use std::sync::Arc;

/// In-memory backends plus the handles to inspect them.
pub struct World {
    pub inventory: InMemoryInventoryStore,
    pub counter: InMemorySlotCounter,
    pub queue: InMemoryIssuanceQueue,
    pub issuances: InMemoryIssuanceRepository,
    pub claims: InMemoryClaimRegistry,
    pub dead_letters: InMemoryDeadLetterSink,
    pub clock: FixedClock,
}

impl World {
    pub fn new() -> Self {
        Self {
            inventory: InMemoryInventoryStore::new(),
            counter: InMemorySlotCounter::new(),
            queue: InMemoryIssuanceQueue::new(),
            issuances: InMemoryIssuanceRepository::new(),
            claims: InMemoryClaimRegistry::new(),
            dead_letters: InMemoryDeadLetterSink::new(),
            clock: test_clock(),
        }
    }

    /// A world with one limited coupon whose counter is seeded.
    pub async fn limited(coupon_id: CouponId, daily_limit: i32) -> Self {
        let world = Self::new();
        world
            .inventory
            .create(coupon_id, daily_limit, world.clock.today())
            .await
            .unwrap();
        world
            .counter
            .set(coupon_id, i64::from(daily_limit))
            .await
            .unwrap();
        world
    }

    pub fn providers(&self) -> Providers {
        Providers {
            inventory: Arc::new(self.inventory.clone()),
            counter: Arc::new(self.counter.clone()),
            queue: Arc::new(self.queue.clone()),
            issuances: Arc::new(self.issuances.clone()),
            claims: Arc::new(self.claims.clone()),
            dead_letters: Arc::new(self.dead_letters.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub fn allocator(&self) -> Arc<SlotAllocator> {
        Arc::new(SlotAllocator::new(self.providers(), AllocatorConfig::default()))
    }

    pub fn available(&self, coupon_id: CouponId) -> i32 {
        self.inventory.snapshot(coupon_id).unwrap().available_today
    }
}
