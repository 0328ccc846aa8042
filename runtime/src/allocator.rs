//! Fast-path allocator: one atomic decrement per attempt, no locks.
//!
//! The post-decrement value decides: `>= 0` grants, `< 0` denies. A denied
//! caller does not increment the counter back. The resulting negative drift
//! only ever under-grants and is overwritten by the next resync.

use crate::breaker::FastPathBreaker;
use crate::metrics::AllocationMetrics;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::error::CounterError;
use coupon_rush_core::types::{CouponId, Decision};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Decrement-and-check against the shared counter.
#[derive(Clone)]
pub struct FastPathAllocator {
    counter: Arc<dyn SlotCounter>,
    breaker: FastPathBreaker,
    timeout: Duration,
}

impl FastPathAllocator {
    /// Create an allocator whose counter calls give up after `timeout`.
    #[must_use]
    pub fn new(counter: Arc<dyn SlotCounter>, breaker: FastPathBreaker, timeout: Duration) -> Self {
        Self {
            counter,
            breaker,
            timeout,
        }
    }

    /// The underlying counter.
    #[must_use]
    pub fn counter(&self) -> &Arc<dyn SlotCounter> {
        &self.counter
    }

    /// The breaker guarding the counter.
    #[must_use]
    pub const fn breaker(&self) -> &FastPathBreaker {
        &self.breaker
    }

    /// Try to take a slot from the shared counter.
    ///
    /// # Errors
    ///
    /// Returns a [`CounterError`] when the fast path is unavailable: the
    /// breaker is open, the call timed out ([`CounterError::Timeout`]), the
    /// counter service failed, or the coupon has no counter yet
    /// ([`CounterError::Unseeded`]). Callers must fall back, not deny.
    pub async fn try_consume(&self, coupon_id: CouponId) -> Result<Decision, CounterError> {
        if !self.breaker.try_acquire().await {
            return Err(CounterError::Unavailable(
                "fast-path breaker is open".to_string(),
            ));
        }

        let outcome = tokio::time::timeout(self.timeout, self.counter.decrement(coupon_id)).await;

        match outcome {
            Ok(Ok(remaining)) => {
                self.breaker.on_success().await;
                let decision = if remaining >= 0 {
                    Decision::Granted
                } else {
                    Decision::Denied
                };
                debug!(coupon_id = %coupon_id, remaining, ?decision, "Fast-path decrement");
                Ok(decision)
            }
            Ok(Err(e @ CounterError::Unseeded(_))) => {
                // the counter service answered; only this key is missing
                self.breaker.on_success().await;
                AllocationMetrics::record_fast_path_failure("unseeded");
                Err(e)
            }
            Ok(Err(e)) => {
                self.breaker.on_failure().await;
                AllocationMetrics::record_fast_path_failure("error");
                Err(e)
            }
            Err(_) => {
                self.breaker.on_failure().await;
                AllocationMetrics::record_fast_path_failure("timeout");
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                Err(CounterError::Timeout(millis))
            }
        }
    }
}
