//! Fallback allocator: row-locked consumption against the durable store.
//!
//! Correct under any interleaving but serializes every caller of the same
//! coupon behind one lock. Used when the fast path is unavailable.

use coupon_rush_core::environment::Clock;
use coupon_rush_core::error::StoreError;
use coupon_rush_core::inventory::{ConsumeOutcome, InventoryStore};
use coupon_rush_core::types::{CouponId, Decision};
use std::sync::Arc;
use tracing::debug;

/// Lock-based allocator over an [`InventoryStore`].
#[derive(Clone)]
pub struct FallbackAllocator {
    inventory: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl FallbackAllocator {
    /// Create a fallback allocator.
    #[must_use]
    pub fn new(inventory: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { inventory, clock }
    }

    /// Take a slot under the row lock.
    ///
    /// A coupon without an inventory row is not quantity-limited and is
    /// always granted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails; nothing is consumed.
    pub async fn consume_with_lock(&self, coupon_id: CouponId) -> Result<Decision, StoreError> {
        let today = self.clock.today();
        let outcome = self.inventory.consume_with_lock(coupon_id, today).await?;
        debug!(coupon_id = %coupon_id, ?outcome, "Fallback consume");
        Ok(match outcome {
            ConsumeOutcome::Consumed | ConsumeOutcome::NotLimited => Decision::Granted,
            ConsumeOutcome::Exhausted => Decision::Denied,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use coupon_rush_testing::{InMemoryInventoryStore, test_clock};

    #[tokio::test]
    async fn grants_then_denies() {
        let clock = test_clock();
        let store = InMemoryInventoryStore::new();
        store.create(CouponId::new(1), 1, clock.today()).await.unwrap();
        let fallback = FallbackAllocator::new(Arc::new(store.clone()), Arc::new(clock));

        assert_eq!(fallback.consume_with_lock(CouponId::new(1)).await.unwrap(), Decision::Granted);
        assert_eq!(fallback.consume_with_lock(CouponId::new(1)).await.unwrap(), Decision::Denied);
        assert_eq!(store.snapshot(CouponId::new(1)).unwrap().available_today, 0);
    }

    #[tokio::test]
    async fn unlimited_coupon_is_granted() {
        let fallback =
            FallbackAllocator::new(Arc::new(InMemoryInventoryStore::new()), Arc::new(test_clock()));
        assert_eq!(fallback.consume_with_lock(CouponId::new(7)).await.unwrap(), Decision::Granted);
    }
}
