#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::Providers;
use crate::service::{AllocatorConfig, SlotAllocator};
use chrono::{Duration, NaiveDate};
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::environment::Clock;
use coupon_rush_core::inventory::InventoryStore;
use coupon_rush_core::queue::IssuanceQueueEntry;
use coupon_rush_core::types::{CouponId, UserId};
use coupon_rush_testing::mocks::FixedClock;
use coupon_rush_testing::{
    InMemoryClaimRegistry, InMemoryDeadLetterSink, InMemoryInventoryStore,
    InMemoryIssuanceQueue, InMemoryIssuanceRepository, InMemorySlotCounter, test_clock,
};
use std::sync::Arc;

/// In-memory providers with handles kept for inspection.
pub struct Harness {
    pub inventory: InMemoryInventoryStore,
    pub counter: InMemorySlotCounter,
    pub queue: InMemoryIssuanceQueue,
    pub issuances: InMemoryIssuanceRepository,
    pub claims: InMemoryClaimRegistry,
    pub dead_letters: InMemoryDeadLetterSink,
    pub clock: FixedClock,
}

impl Harness {
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

    /// Harness with `coupon_id` limited to `limit` per day and its counter seeded.
    pub async fn with_limited(coupon_id: CouponId, limit: i32) -> Self {
        let h = Self::new();
        h.inventory
            .create(coupon_id, limit, h.today())
            .await
            .unwrap();
        h.counter.set(coupon_id, i64::from(limit)).await.unwrap();
        h
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
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

    pub fn allocator(&self) -> SlotAllocator {
        self.allocator_with(AllocatorConfig::default())
    }

    pub fn allocator_with(&self, config: AllocatorConfig) -> SlotAllocator {
        SlotAllocator::new(self.providers(), config)
    }
}

/// Queue entry for coupon 1 requested now.
pub fn entry(h: &Harness, user: i64) -> IssuanceQueueEntry {
    let now = h.clock.now();
    IssuanceQueueEntry::new(CouponId::new(1), UserId::new(user), now, now + Duration::days(30))
}
