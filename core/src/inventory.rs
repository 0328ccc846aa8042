//! Durable per-coupon capacity state.
//!
//! [`CouponInventory`] is the single source of truth for how many slots a
//! limited coupon has left today. The fast-path counter is only a cache of
//! `available_today` and is corrected against this record by reconciliation.
//!
//! # Invariant
//!
//! At rest, `0 <= available_today <= daily_limit`. Every mutating method on
//! [`InventoryStore`] must preserve it under concurrent callers.

use crate::BoxFuture;
use crate::error::StoreError;
use crate::types::CouponId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Capacity record of a quantity-limited coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponInventory {
    /// Coupon this record limits (1:1).
    pub coupon_id: CouponId,
    /// Capacity replenished every business day.
    pub daily_limit: i32,
    /// Remaining capacity for `last_reset_date`.
    pub available_today: i32,
    /// Day of the most recent replenishment.
    pub last_reset_date: Option<NaiveDate>,
}

impl CouponInventory {
    /// New inventory, fully available as of `today`.
    #[must_use]
    pub const fn new(coupon_id: CouponId, daily_limit: i32, today: NaiveDate) -> Self {
        Self {
            coupon_id,
            daily_limit,
            available_today: daily_limit,
            last_reset_date: Some(today),
        }
    }

    /// Whether the record is due for replenishment on `today`.
    #[must_use]
    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.last_reset_date.is_none_or(|last| last < today)
    }

    /// Replenish capacity if the last reset happened before `today`.
    ///
    /// Idempotent. Returns `true` when the record changed.
    pub fn reset_if_needed(&mut self, today: NaiveDate) -> bool {
        if !self.needs_reset(today) {
            return false;
        }
        self.available_today = self.daily_limit;
        self.last_reset_date = Some(today);
        true
    }

    /// `true` iff at least one slot remains.
    #[must_use]
    pub const fn has_available(&self) -> bool {
        self.available_today > 0
    }

    /// Take one slot. Returns `false` (and changes nothing) when exhausted.
    pub const fn consume_one(&mut self) -> bool {
        if self.available_today <= 0 {
            return false;
        }
        self.available_today -= 1;
        true
    }

    /// Give one slot back, never exceeding `daily_limit`.
    pub fn release_one(&mut self) {
        self.available_today = (self.available_today + 1).min(self.daily_limit);
    }
}

/// Result of [`InventoryStore::consume_with_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A slot was taken.
    Consumed,
    /// No slot left today.
    Exhausted,
    /// The coupon has no inventory row and is not quantity-limited.
    NotLimited,
}

/// Durable storage of coupon inventories.
///
/// Implementations must make every mutation atomic with respect to concurrent
/// callers on the same coupon. All operations that take `today` apply
/// reset-if-needed semantics before acting, so a stale row is replenished
/// before it is consumed.
pub trait InventoryStore: Send + Sync {
    /// Whether `coupon_id` is quantity-limited.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the store cannot be queried.
    fn exists(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Read an inventory without locking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the store cannot be queried.
    fn find(
        &self,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>>;

    /// Register a quantity-limited coupon with `daily_limit` slots per day,
    /// fully available as of `today`. Re-registering updates the limit and
    /// refills the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn create(
        &self,
        coupon_id: CouponId,
        daily_limit: i32,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<CouponInventory, StoreError>>;

    /// Decrement `available_today` by one only if it is currently positive.
    ///
    /// Executed as a single atomic conditional update without holding a lock
    /// across round trips. Returns whether the decrement applied; `false` for
    /// an exhausted or missing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn conditional_decrement(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Take one slot under an exclusive row lock.
    ///
    /// Other callers on the same coupon block until the lock is released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure; the lock is released and
    /// nothing is consumed.
    fn consume_with_lock(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<ConsumeOutcome, StoreError>>;

    /// Return one slot, capped at `daily_limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn release_slot(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Replenish every inventory whose last reset is missing or before `today`.
    ///
    /// Returns the number of rows replenished. A second call on the same day
    /// returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn reset_all(&self, today: NaiveDate) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Replenish one inventory if due and return its current state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn reset_if_needed(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>>;

    /// All inventories, ordered by coupon id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<CouponInventory>, StoreError>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn reset_replenishes_once_per_day() {
        let mut inv = CouponInventory::new(CouponId::new(1), 10, day(1));
        inv.available_today = 3;

        assert!(!inv.reset_if_needed(day(1)));
        assert_eq!(inv.available_today, 3);

        assert!(inv.reset_if_needed(day(2)));
        assert_eq!(inv.available_today, 10);
        assert_eq!(inv.last_reset_date, Some(day(2)));

        inv.available_today = 4;
        assert!(!inv.reset_if_needed(day(2)));
        assert_eq!(inv.available_today, 4);
    }

    #[test]
    fn missing_reset_date_is_due() {
        let mut inv = CouponInventory {
            coupon_id: CouponId::new(1),
            daily_limit: 5,
            available_today: 0,
            last_reset_date: None,
        };
        assert!(inv.reset_if_needed(day(1)));
        assert_eq!(inv.available_today, 5);
    }

    #[test]
    fn consume_stops_at_zero() {
        let mut inv = CouponInventory::new(CouponId::new(1), 2, day(1));
        assert!(inv.consume_one());
        assert!(inv.consume_one());
        assert!(!inv.has_available());
        assert!(!inv.consume_one());
        assert_eq!(inv.available_today, 0);
    }

    #[test]
    fn release_is_capped() {
        let mut inv = CouponInventory::new(CouponId::new(1), 2, day(1));
        inv.release_one();
        assert_eq!(inv.available_today, 2);
        inv.consume_one();
        inv.release_one();
        assert_eq!(inv.available_today, 2);
    }

    proptest! {
        #[test]
        fn never_negative_never_above_limit(
            limit in 1..50i32,
            ops in prop::collection::vec(0..3u8, 0..200),
        ) {
            let mut inv = CouponInventory::new(CouponId::new(1), limit, day(1));
            let mut d = 1;
            for op in ops {
                match op {
                    0 => { inv.consume_one(); }
                    1 => inv.release_one(),
                    _ => {
                        d = (d % 27) + 1;
                        inv.reset_if_needed(day(d));
                    }
                }
                prop_assert!(inv.available_today >= 0);
                prop_assert!(inv.available_today <= inv.daily_limit);
            }
        }
    }
}
