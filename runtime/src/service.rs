//! Slot allocation service.
//!
//! [`SlotAllocator::allocate`] is the single entry point for "user U wants
//! coupon C". It runs, in order:
//!
//! 1. duplicate pre-check in the [`ClaimRegistry`], falling back to the
//!    issuance records when the registry is down;
//! 2. the limited/unlimited check (no inventory row means unlimited);
//! 3. the fast path, finalised by a conditional decrement of the durable
//!    inventory, or the row-locked fallback when the fast path is unavailable;
//! 4. hand-off to the issuance queue (or inline persistence in synchronous
//!    mode), returning the slot if the hand-off fails.
//!
//! The claim is released whenever the request ends sold out or failed.
//!
//! [`ClaimRegistry`]: coupon_rush_core::claims::ClaimRegistry

use crate::Providers;
use crate::allocator::FastPathAllocator;
use crate::breaker::{BreakerConfig, FastPathBreaker};
use crate::fallback::FallbackAllocator;
use crate::metrics::{AllocationMetrics, ReconciliationMetrics};
use crate::reconciliation::{ReconciliationConfig, ReconciliationJob};
use crate::retry::RetryPolicy;
use coupon_rush_core::error::{AllocationError, CounterError};
use coupon_rush_core::issuance::{InsertOutcome, IssuanceRecord};
use coupon_rush_core::queue::IssuanceQueueEntry;
use coupon_rush_core::types::{AllocationOutcome, AllocationPath, CouponId, Decision, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Allocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorConfig {
    /// Deadline for a single fast-path counter call
    pub fast_path_timeout: Duration,
    /// Hand granted slots to the queue (`true`) or persist inline (`false`)
    pub async_enabled: bool,
    /// How long an issued coupon stays usable
    pub validity: chrono::Duration,
    /// Backoff for entries deferred by a failed inline persistence
    pub retry: RetryPolicy,
    /// Fast-path breaker settings
    pub breaker: BreakerConfig,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            fast_path_timeout: Duration::from_millis(200),
            async_enabled: true,
            validity: chrono::Duration::days(30),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

enum ClaimStatus {
    Claimed,
    Duplicate,
    Unverified,
}

/// Orchestrates claim, decision and issuance hand-off.
#[derive(Clone)]
pub struct SlotAllocator {
    providers: Providers,
    fast_path: FastPathAllocator,
    fallback: FallbackAllocator,
    reseed: Arc<ReconciliationJob>,
    config: AllocatorConfig,
}

impl SlotAllocator {
    /// Build an allocator over `providers`.
    #[must_use]
    pub fn new(providers: Providers, config: AllocatorConfig) -> Self {
        let fast_path = FastPathAllocator::new(
            providers.counter.clone(),
            FastPathBreaker::new(config.breaker.clone()),
            config.fast_path_timeout,
        );
        let fallback = FallbackAllocator::new(providers.inventory.clone(), providers.clock.clone());
        let reseed = Arc::new(ReconciliationJob::new(
            providers.clone(),
            ReconciliationConfig::default(),
        ));
        Self {
            providers,
            fast_path,
            fallback,
            reseed,
            config,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The fast-path allocator, for breaker inspection.
    #[must_use]
    pub const fn fast_path(&self) -> &FastPathAllocator {
        &self.fast_path
    }

    /// Allocate one slot of `coupon_id` to `user_id`.
    ///
    /// # Errors
    ///
    /// - [`AllocationError::Store`] if the durable store failed while deciding.
    ///   No slot was consumed.
    /// - [`AllocationError::Queue`] if a granted slot could not be handed to
    ///   issuance. The slot was returned.
    pub async fn allocate(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<AllocationOutcome, AllocationError> {
        let started = Instant::now();
        let result = self.allocate_inner(user_id, coupon_id).await;
        AllocationMetrics::record_duration(started.elapsed());

        match &result {
            Ok(AllocationOutcome::Duplicate) => AllocationMetrics::record_duplicate(),
            Ok(_) => {}
            Err(e) => {
                AllocationMetrics::record_error();
                error!(user_id = %user_id, coupon_id = %coupon_id, error = %e, "Allocation failed");
            }
        }
        result
    }

    async fn allocate_inner(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<AllocationOutcome, AllocationError> {
        let claimed = match self.claim(user_id, coupon_id).await? {
            ClaimStatus::Duplicate => return Ok(AllocationOutcome::Duplicate),
            ClaimStatus::Claimed => true,
            ClaimStatus::Unverified => false,
        };

        let result = self.decide_and_issue(user_id, coupon_id).await;

        let keep_claim = matches!(
            result,
            Ok(AllocationOutcome::Issued { .. } | AllocationOutcome::Duplicate)
        );
        if claimed && !keep_claim {
            if let Err(e) = self.providers.claims.release(user_id, coupon_id).await {
                warn!(user_id = %user_id, coupon_id = %coupon_id, error = %e, "Failed to release claim");
            }
        }
        result
    }

    async fn claim(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<ClaimStatus, AllocationError> {
        match self.providers.claims.claim(user_id, coupon_id).await {
            Ok(true) => Ok(ClaimStatus::Claimed),
            Ok(false) => Ok(ClaimStatus::Duplicate),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    coupon_id = %coupon_id,
                    error = %e,
                    "Claim registry unavailable, checking issuance records"
                );
                if self.providers.issuances.exists(user_id, coupon_id).await? {
                    Ok(ClaimStatus::Duplicate)
                } else {
                    Ok(ClaimStatus::Unverified)
                }
            }
        }
    }

    async fn decide_and_issue(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<AllocationOutcome, AllocationError> {
        let (decision, path) = self.decide(coupon_id).await?;
        AllocationMetrics::record_decision(path, decision);
        debug!(user_id = %user_id, coupon_id = %coupon_id, %path, ?decision, "Slot decision");

        match decision {
            Decision::Denied => Ok(AllocationOutcome::SoldOut { path }),
            Decision::Granted => self.issue(user_id, coupon_id, path).await,
        }
    }

    async fn decide(
        &self,
        coupon_id: CouponId,
    ) -> Result<(Decision, AllocationPath), AllocationError> {
        if !self.providers.inventory.exists(coupon_id).await? {
            return Ok((Decision::Granted, AllocationPath::Unlimited));
        }

        match self.fast_path.try_consume(coupon_id).await {
            Ok(Decision::Denied) => Ok((Decision::Denied, AllocationPath::FastPath)),
            Ok(Decision::Granted) => {
                let decision = self.finalize(coupon_id).await?;
                Ok((decision, AllocationPath::FastPath))
            }
            Err(e) => {
                warn!(coupon_id = %coupon_id, error = %e, "Fast path unavailable, using row lock");
                let decision = self.fallback.consume_with_lock(coupon_id).await?;
                if matches!(e, CounterError::Unseeded(_)) {
                    self.reseed_counter(coupon_id).await;
                }
                Ok((decision, AllocationPath::Fallback))
            }
        }
    }

    /// Seed a missing counter from the durable store so later requests can
    /// use the fast path again. Best effort: the next resync retries.
    async fn reseed_counter(&self, coupon_id: CouponId) {
        match self.reseed.resync_fast_path_counter(coupon_id).await {
            Ok(Some(available)) => {
                info!(coupon_id = %coupon_id, available, "Seeded missing fast-path counter");
            }
            Ok(None) => {}
            Err(e) => warn!(coupon_id = %coupon_id, error = %e, "Failed to seed fast-path counter"),
        }
    }

    /// Confirm a fast-path grant against the durable inventory.
    async fn finalize(&self, coupon_id: CouponId) -> Result<Decision, AllocationError> {
        let today = self.providers.clock.today();
        match self
            .providers
            .inventory
            .conditional_decrement(coupon_id, today)
            .await
        {
            Ok(true) => Ok(Decision::Granted),
            Ok(false) => {
                warn!(coupon_id = %coupon_id, "Counter ahead of durable inventory, forcing counter to 0");
                ReconciliationMetrics::record_drift();
                if let Err(e) = self.fast_path.counter().set(coupon_id, 0).await {
                    warn!(coupon_id = %coupon_id, error = %e, "Failed to zero drifted counter");
                }
                Ok(Decision::Denied)
            }
            Err(e) => {
                self.restore_counter(coupon_id).await;
                Err(e.into())
            }
        }
    }

    async fn issue(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        path: AllocationPath,
    ) -> Result<AllocationOutcome, AllocationError> {
        let now = self.providers.clock.now();
        let entry = IssuanceQueueEntry::new(coupon_id, user_id, now, now + self.config.validity);

        if !self.config.async_enabled {
            return self.issue_inline(entry, path).await;
        }

        if let Err(e) = self.providers.queue.enqueue(entry).await {
            error!(
                user_id = %user_id,
                coupon_id = %coupon_id,
                error = %e,
                "Failed to enqueue granted slot, returning it"
            );
            self.compensate(coupon_id, path).await;
            return Err(e.into());
        }
        Ok(AllocationOutcome::Issued { path })
    }

    async fn issue_inline(
        &self,
        mut entry: IssuanceQueueEntry,
        path: AllocationPath,
    ) -> Result<AllocationOutcome, AllocationError> {
        let coupon_id = entry.coupon_id;
        match self
            .providers
            .issuances
            .insert_if_absent(IssuanceRecord::from(&entry))
            .await
        {
            Ok(InsertOutcome::Inserted) => Ok(AllocationOutcome::Issued { path }),
            Ok(InsertOutcome::AlreadyIssued) => {
                self.compensate(coupon_id, path).await;
                Ok(AllocationOutcome::Duplicate)
            }
            Err(e) => {
                warn!(
                    user_id = %entry.user_id,
                    coupon_id = %coupon_id,
                    error = %e,
                    "Inline issuance failed, routing to retry queue"
                );
                let delay = chrono::Duration::from_std(self.config.retry.jittered_delay(1))
                    .unwrap_or_else(|_| chrono::Duration::seconds(1));
                entry.record_failure(e.to_string(), self.providers.clock.now() + delay);
                if let Err(qe) = self.providers.queue.enqueue_retry(entry).await {
                    self.compensate(coupon_id, path).await;
                    return Err(qe.into());
                }
                Ok(AllocationOutcome::Issued { path })
            }
        }
    }

    /// Return a granted slot that will not be issued.
    async fn compensate(&self, coupon_id: CouponId, path: AllocationPath) {
        if path == AllocationPath::Unlimited {
            return;
        }

        if let Err(e) = self.providers.inventory.release_slot(coupon_id).await {
            error!(coupon_id = %coupon_id, error = %e, "Failed to release durable slot");
        }
        if path == AllocationPath::FastPath {
            self.restore_counter(coupon_id).await;
        }
        AllocationMetrics::record_compensation();
    }

    async fn restore_counter(&self, coupon_id: CouponId) {
        let restore = self.fast_path.counter().increment(coupon_id);
        match tokio::time::timeout(self.config.fast_path_timeout, restore).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(coupon_id = %coupon_id, error = %e, "Failed to restore fast-path slot");
            }
            Err(_) => warn!(coupon_id = %coupon_id, "Timed out restoring fast-path slot"),
        }
    }
}
