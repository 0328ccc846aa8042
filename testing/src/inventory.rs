//! In-memory [`InventoryStore`].

use crate::faults::FaultSwitch;
use chrono::NaiveDate;
use coupon_rush_core::error::StoreError;
use coupon_rush_core::inventory::{ConsumeOutcome, CouponInventory, InventoryStore};
use coupon_rush_core::types::CouponId;
use coupon_rush_core::BoxFuture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// `BTreeMap`-backed inventory store.
///
/// A single mutex plays the role of the row lock, so every operation is
/// atomic. [`locked_consumes`](Self::locked_consumes) counts fallback
/// allocations for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    rows: Arc<Mutex<BTreeMap<CouponId, CouponInventory>>>,
    locked_consumes: Arc<AtomicU64>,
    faults: FaultSwitch,
}

fn poisoned() -> StoreError {
    StoreError::Database("Mutex lock failed".to_string())
}

impl InMemoryInventoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row as-is.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn insert(&self, inventory: CouponInventory) {
        self.rows
            .lock()
            .unwrap()
            .insert(inventory.coupon_id, inventory);
    }

    /// Current row, bypassing fault injection.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn snapshot(&self, coupon_id: CouponId) -> Option<CouponInventory> {
        self.rows.lock().unwrap().get(&coupon_id).cloned()
    }

    /// Number of successful [`InventoryStore::consume_with_lock`] calls.
    #[must_use]
    pub fn locked_consumes(&self) -> u64 {
        self.locked_consumes.load(Ordering::SeqCst)
    }

    /// Fault switches for this store.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    async fn guard(&self) -> Result<(), StoreError> {
        self.faults.check().await.map_err(StoreError::Database)
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn exists(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let rows = self.rows.lock().map_err(|_| poisoned())?;
            Ok(rows.contains_key(&coupon_id))
        })
    }

    fn find(
        &self,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let rows = self.rows.lock().map_err(|_| poisoned())?;
            Ok(rows.get(&coupon_id).cloned())
        })
    }

    fn create(
        &self,
        coupon_id: CouponId,
        daily_limit: i32,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<CouponInventory, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let inventory = CouponInventory::new(coupon_id, daily_limit, today);
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            rows.insert(coupon_id, inventory.clone());
            Ok(inventory)
        })
    }

    fn conditional_decrement(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            Ok(rows.get_mut(&coupon_id).is_some_and(|inv| {
                inv.reset_if_needed(today);
                inv.consume_one()
            }))
        })
    }

    fn consume_with_lock(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<ConsumeOutcome, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            let Some(inv) = rows.get_mut(&coupon_id) else {
                return Ok(ConsumeOutcome::NotLimited);
            };
            inv.reset_if_needed(today);
            if inv.consume_one() {
                self.locked_consumes.fetch_add(1, Ordering::SeqCst);
                Ok(ConsumeOutcome::Consumed)
            } else {
                Ok(ConsumeOutcome::Exhausted)
            }
        })
    }

    fn release_slot(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            if let Some(inv) = rows.get_mut(&coupon_id) {
                inv.release_one();
            }
            Ok(())
        })
    }

    fn reset_all(&self, today: NaiveDate) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            let mut reset = 0;
            for inv in rows.values_mut() {
                if inv.reset_if_needed(today) {
                    reset += 1;
                }
            }
            Ok(reset)
        })
    }

    fn reset_if_needed(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut rows = self.rows.lock().map_err(|_| poisoned())?;
            Ok(rows.get_mut(&coupon_id).map(|inv| {
                inv.reset_if_needed(today);
                inv.clone()
            }))
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<CouponInventory>, StoreError>> {
        Box::pin(async move {
            self.guard().await?;
            let rows = self.rows.lock().map_err(|_| poisoned())?;
            Ok(rows.values().cloned().collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[tokio::test]
    async fn conditional_decrement_stops_at_zero() {
        let store = InMemoryInventoryStore::new();
        store.create(CouponId::new(1), 2, day(1)).await.unwrap();

        assert!(store.conditional_decrement(CouponId::new(1), day(1)).await.unwrap());
        assert!(store.conditional_decrement(CouponId::new(1), day(1)).await.unwrap());
        assert!(!store.conditional_decrement(CouponId::new(1), day(1)).await.unwrap());
        assert_eq!(store.snapshot(CouponId::new(1)).unwrap().available_today, 0);
    }

    #[tokio::test]
    async fn consume_with_lock_replenishes_stale_row() {
        let store = InMemoryInventoryStore::new();
        store.insert(CouponInventory {
            coupon_id: CouponId::new(1),
            daily_limit: 3,
            available_today: 0,
            last_reset_date: Some(day(1)),
        });

        let outcome = store.consume_with_lock(CouponId::new(1), day(2)).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed);
        assert_eq!(store.snapshot(CouponId::new(1)).unwrap().available_today, 2);
        assert_eq!(store.locked_consumes(), 1);
    }

    #[tokio::test]
    async fn unknown_coupon_is_not_limited() {
        let store = InMemoryInventoryStore::new();
        let outcome = store.consume_with_lock(CouponId::new(9), day(1)).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::NotLimited);
        assert!(!store.conditional_decrement(CouponId::new(9), day(1)).await.unwrap());
    }

    #[tokio::test]
    async fn outage_surfaces_as_database_error() {
        let store = InMemoryInventoryStore::new();
        store.faults().set_unavailable(true);
        let err = store.exists(CouponId::new(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
