//! Error taxonomy.
//!
//! Capacity exhaustion and duplicate issuance are outcomes, not errors; see
//! [`crate::types::Decision`] and [`crate::issuance::InsertOutcome`]. The
//! enums here cover infrastructure failures only.

use crate::types::CouponId;
use thiserror::Error;

/// Errors from the durable store (inventory, issuance records, dead letters).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The requested row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the fast-path counter.
///
/// Every variant means "fast path unavailable": the allocator falls back to
/// the durable store instead of denying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// Connection refused, reset or otherwise unreachable.
    #[error("Counter unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within the configured deadline.
    #[error("Counter operation timed out after {0} ms")]
    Timeout(u64),

    /// The stored value is not an integer.
    #[error("Counter value corrupt: {0}")]
    Corrupt(String),

    /// No counter exists for the coupon (never seeded, or lost by the
    /// backing service). The durable store must decide until it is reseeded.
    #[error("Counter for coupon {0} is not seeded")]
    Unseeded(CouponId),
}

/// Errors from the issuance queues and claim registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Backing service unreachable.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// Entry could not be encoded or decoded.
    #[error("Queue serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced to callers of the allocation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The durable store failed while deciding or finalising a slot.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A granted slot could not be handed to issuance; the slot was returned.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Inventory was expected for this coupon but is missing.
    #[error("Coupon {0} has no inventory")]
    CouponNotFound(CouponId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_error_wraps_sources() {
        let err: AllocationError = StoreError::Database("connection reset".into()).into();
        assert_eq!(err.to_string(), "Store error: Database error: connection reset");

        let err: AllocationError = QueueError::Unavailable("refused".into()).into();
        assert!(matches!(err, AllocationError::Queue(_)));
    }

    #[test]
    fn timeout_message_carries_deadline() {
        assert_eq!(
            CounterError::Timeout(200).to_string(),
            "Counter operation timed out after 200 ms"
        );
        assert_eq!(
            CounterError::Unseeded(CouponId::new(3)).to_string(),
            "Counter for coupon 3 is not seeded"
        );
    }
}
