//! Issuance queue entries and the queue abstraction.
//!
//! A granted slot becomes an [`IssuanceQueueEntry`] on the main queue. The
//! worker turns it into an [`IssuanceRecord`](crate::issuance::IssuanceRecord);
//! failures go to the retry queue with an incremented attempt count and a
//! `not_before` deadline. An entry leaves the system only as a persisted
//! record or a dead letter.

use crate::BoxFuture;
use crate::error::QueueError;
use crate::types::{CouponId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A granted but not yet persisted slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceQueueEntry {
    /// Coupon granted.
    pub coupon_id: CouponId,
    /// Receiving user.
    pub user_id: UserId,
    /// When the slot was granted.
    pub requested_at: DateTime<Utc>,
    /// When the issued coupon stops being usable.
    pub expires_at: DateTime<Utc>,
    /// Failed persistence attempts so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// Earliest time a retry may be attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl IssuanceQueueEntry {
    /// Fresh entry for a slot granted at `requested_at`.
    #[must_use]
    pub const fn new(
        coupon_id: CouponId,
        user_id: UserId,
        requested_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            coupon_id,
            user_id,
            requested_at,
            expires_at,
            attempt_count: 0,
            not_before: None,
            last_error: None,
        }
    }

    /// Whether a retry may run at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|t| t <= now)
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>, not_before: DateTime<Utc>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.not_before = Some(not_before);
    }

    /// Encode for a string-valued queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Decode from a string-valued queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] for malformed payloads.
    pub fn from_json(payload: &str) -> Result<Self, QueueError> {
        serde_json::from_str(payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// Main and retry queues of granted slots.
///
/// Both queues are FIFO. Every method is a single atomic operation on the
/// backing service, so concurrent producers and a draining worker never lose
/// or duplicate an entry.
pub trait IssuanceQueue: Send + Sync {
    /// Append to the main queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the entry was not accepted.
    fn enqueue(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>>;

    /// Remove and return the oldest main-queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on backend failure or an undecodable entry.
    fn poll(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>>;

    /// Append to the retry queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the entry was not accepted.
    fn enqueue_retry(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>>;

    /// Remove and return the oldest retry-queue entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on backend failure or an undecodable entry.
    fn poll_retry(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>>;

    /// Main-queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] on backend failure.
    fn queue_size(&self) -> BoxFuture<'_, Result<u64, QueueError>>;

    /// Retry-queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] on backend failure.
    fn retry_size(&self) -> BoxFuture<'_, Result<u64, QueueError>>;

    /// Move up to `limit` retry entries back onto the main queue, oldest
    /// first, clearing their `not_before`. Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on backend failure; entries already moved stay
    /// moved.
    fn requeue_retry(&self, limit: u64) -> BoxFuture<'_, Result<u64, QueueError>>;

    /// Drop every retry entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unavailable`] on backend failure.
    fn clear_retry(&self) -> BoxFuture<'_, Result<(), QueueError>>;
}
