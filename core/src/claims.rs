//! Per-coupon set of users holding a pending or completed claim.
//!
//! Lets the allocator reject a repeat request before it consumes capacity.
//! The durable uniqueness constraint on issuance records stays the
//! correctness guarantee; this registry only saves slots.

use crate::BoxFuture;
use crate::error::QueueError;
use crate::types::{CouponId, UserId};

/// Registry of `(user, coupon)` claims.
pub trait ClaimRegistry: Send + Sync {
    /// Atomically add the claim. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] if the registry is unreachable.
    fn claim(&self, user_id: UserId, coupon_id: CouponId)
    -> BoxFuture<'_, Result<bool, QueueError>>;

    /// Remove the claim. Removing an absent claim is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] if the registry is unreachable.
    fn release(&self, user_id: UserId, coupon_id: CouponId)
    -> BoxFuture<'_, Result<(), QueueError>>;
}
