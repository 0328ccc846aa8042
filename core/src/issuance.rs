//! Durable issuance records.

use crate::BoxFuture;
use crate::error::StoreError;
use crate::queue::IssuanceQueueEntry;
use crate::types::{CouponId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that a user received a coupon. At most one per `(user, coupon)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    /// Receiving user.
    pub user_id: UserId,
    /// Issued coupon.
    pub coupon_id: CouponId,
    /// When the slot was granted.
    pub issued_at: DateTime<Utc>,
    /// When the coupon stops being usable.
    pub expires_at: DateTime<Utc>,
}

impl From<&IssuanceQueueEntry> for IssuanceRecord {
    fn from(entry: &IssuanceQueueEntry) -> Self {
        Self {
            user_id: entry.user_id,
            coupon_id: entry.coupon_id,
            issued_at: entry.requested_at,
            expires_at: entry.expires_at,
        }
    }
}

/// Result of [`IssuanceRepository::insert_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written.
    Inserted,
    /// A record for this `(user, coupon)` already existed; nothing changed.
    AlreadyIssued,
}

/// Storage of issuance records.
pub trait IssuanceRepository: Send + Sync {
    /// Insert unless a record for the same `(user, coupon)` exists.
    ///
    /// A duplicate is reported as [`InsertOutcome::AlreadyIssued`], not as an
    /// error, so replays are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] for transient failures.
    fn insert_if_absent(
        &self,
        record: IssuanceRecord,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>>;

    /// Whether `user_id` already holds `coupon_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn exists(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Number of records issued for `coupon_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn count_for_coupon(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<u64, StoreError>>;
}
