//! Fast-path slot counter.
//!
//! A shared atomic integer per coupon, seeded from
//! [`CouponInventory::available_today`](crate::inventory::CouponInventory).
//! The counter is not authoritative: it may go negative under contention and
//! may drift from the durable store after partial failures. Reconciliation
//! overwrites it with the durable value.

use crate::BoxFuture;
use crate::error::CounterError;
use crate::types::CouponId;

/// Shared atomic counter backing the fast path.
///
/// Implementations must make [`decrement`](Self::decrement) a single atomic
/// read-modify-write visible to every allocator instance.
pub trait SlotCounter: Send + Sync {
    /// Atomically decrement and return the post-decrement value.
    ///
    /// A missing counter is left missing: the fast path must not answer for
    /// a coupon until it has been seeded from the durable store.
    ///
    /// # Errors
    ///
    /// [`CounterError::Unseeded`] if no counter exists for `coupon_id`. Any
    /// [`CounterError`] means the fast path is unavailable.
    fn decrement(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>>;

    /// Atomically increment and return the post-increment value.
    ///
    /// # Errors
    ///
    /// Any [`CounterError`] means the fast path is unavailable.
    fn increment(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>>;

    /// Overwrite the counter.
    ///
    /// # Errors
    ///
    /// Any [`CounterError`] means the fast path is unavailable.
    fn set(&self, coupon_id: CouponId, value: i64) -> BoxFuture<'_, Result<(), CounterError>>;

    /// Current value, `None` if never seeded.
    ///
    /// # Errors
    ///
    /// Any [`CounterError`] means the fast path is unavailable.
    fn get(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<Option<i64>, CounterError>>;
}
