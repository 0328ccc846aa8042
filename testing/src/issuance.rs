//! In-memory [`IssuanceRepository`], [`ClaimRegistry`] and [`DeadLetterSink`].

use crate::faults::FaultSwitch;
use chrono::Utc;
use coupon_rush_core::BoxFuture;
use coupon_rush_core::claims::ClaimRegistry;
use coupon_rush_core::dead_letter::{DeadLetterSink, FailedIssuance};
use coupon_rush_core::error::{QueueError, StoreError};
use coupon_rush_core::issuance::{InsertOutcome, IssuanceRecord, IssuanceRepository};
use coupon_rush_core::queue::IssuanceQueueEntry;
use coupon_rush_core::types::{CouponId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

fn poisoned() -> StoreError {
    StoreError::Database("Mutex lock failed".to_string())
}

/// Issuance records keyed by `(user, coupon)`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssuanceRepository {
    records: Arc<Mutex<HashMap<(UserId, CouponId), IssuanceRecord>>>,
    faults: FaultSwitch,
}

impl InMemoryIssuanceRepository {
    /// No records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn records(&self) -> Vec<IssuanceRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fault switches for this repository.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }
}

impl IssuanceRepository for InMemoryIssuanceRepository {
    fn insert_if_absent(
        &self,
        record: IssuanceRecord,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            let mut records = self.records.lock().map_err(|_| poisoned())?;
            let key = (record.user_id, record.coupon_id);
            if records.contains_key(&key) {
                return Ok(InsertOutcome::AlreadyIssued);
            }
            records.insert(key, record);
            Ok(InsertOutcome::Inserted)
        })
    }

    fn exists(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            let records = self.records.lock().map_err(|_| poisoned())?;
            Ok(records.contains_key(&(user_id, coupon_id)))
        })
    }

    fn count_for_coupon(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            let records = self.records.lock().map_err(|_| poisoned())?;
            Ok(records.keys().filter(|(_, c)| *c == coupon_id).count() as u64)
        })
    }
}

/// Claim set per coupon.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClaimRegistry {
    claims: Arc<Mutex<HashSet<(UserId, CouponId)>>>,
    faults: FaultSwitch,
}

impl InMemoryClaimRegistry {
    /// No claims.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the claim is held, bypassing fault injection.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn is_claimed(&self, user_id: UserId, coupon_id: CouponId) -> bool {
        self.claims.lock().unwrap().contains(&(user_id, coupon_id))
    }

    /// Fault switches for this registry.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }
}

impl ClaimRegistry for InMemoryClaimRegistry {
    fn claim(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<bool, QueueError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(QueueError::Unavailable)?;
            let mut claims = self
                .claims
                .lock()
                .map_err(|_| QueueError::Unavailable("Mutex lock failed".to_string()))?;
            Ok(claims.insert((user_id, coupon_id)))
        })
    }

    fn release(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(QueueError::Unavailable)?;
            let mut claims = self
                .claims
                .lock()
                .map_err(|_| QueueError::Unavailable("Mutex lock failed".to_string()))?;
            claims.remove(&(user_id, coupon_id));
            Ok(())
        })
    }
}

/// Dead letters in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    entries: Arc<Mutex<Vec<FailedIssuance>>>,
    faults: FaultSwitch,
}

impl InMemoryDeadLetterSink {
    /// No dead letters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dead letter.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn entries(&self) -> Vec<FailedIssuance> {
        self.entries.lock().unwrap().clone()
    }

    /// Fault switches for this sink.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn add_entry(
        &self,
        entry: IssuanceQueueEntry,
        error_message: String,
    ) -> BoxFuture<'_, Result<i64, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            let mut entries = self.entries.lock().map_err(|_| poisoned())?;
            let id = i64::try_from(entries.len())
                .map_err(|e| StoreError::Database(e.to_string()))?
                + 1;
            entries.push(FailedIssuance {
                id,
                entry,
                error_message,
                failed_at: Utc::now(),
            });
            Ok(id)
        })
    }

    fn count_pending(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            Ok(self.entries.lock().map_err(|_| poisoned())?.len() as u64)
        })
    }

    fn list_pending(&self, limit: u32) -> BoxFuture<'_, Result<Vec<FailedIssuance>, StoreError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(StoreError::Database)?;
            let entries = self.entries.lock().map_err(|_| poisoned())?;
            Ok(entries.iter().take(limit as usize).cloned().collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user: i64) -> IssuanceRecord {
        let now = Utc::now();
        IssuanceRecord {
            user_id: UserId::new(user),
            coupon_id: CouponId::new(1),
            issued_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn second_insert_is_already_issued() {
        let repo = InMemoryIssuanceRepository::new();
        assert_eq!(repo.insert_if_absent(record(1)).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            repo.insert_if_absent(record(1)).await.unwrap(),
            InsertOutcome::AlreadyIssued
        );
        assert_eq!(repo.count_for_coupon(CouponId::new(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fail_next_recovers() {
        let repo = InMemoryIssuanceRepository::new();
        repo.faults().fail_next(2);
        assert!(repo.insert_if_absent(record(1)).await.is_err());
        assert!(repo.insert_if_absent(record(1)).await.is_err());
        assert!(repo.insert_if_absent(record(1)).await.is_ok());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn claim_is_set_semantics() {
        let claims = InMemoryClaimRegistry::new();
        assert!(claims.claim(UserId::new(1), CouponId::new(1)).await.unwrap());
        assert!(!claims.claim(UserId::new(1), CouponId::new(1)).await.unwrap());
        claims.release(UserId::new(1), CouponId::new(1)).await.unwrap();
        assert!(!claims.is_claimed(UserId::new(1), CouponId::new(1)));
    }
}
