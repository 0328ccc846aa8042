//! In-memory [`SlotCounter`].

use crate::faults::FaultSwitch;
use coupon_rush_core::BoxFuture;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::error::CounterError;
use coupon_rush_core::types::CouponId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Counter map with the semantics of the Redis-backed counter: `INCR`,
/// `SET` and `GET` as in Redis, and a decrement that refuses missing keys.
///
/// Use [`faults`](Self::faults) to simulate an unreachable or slow counter
/// service.
#[derive(Debug, Clone, Default)]
pub struct InMemorySlotCounter {
    values: Arc<Mutex<HashMap<CouponId, i64>>>,
    faults: FaultSwitch,
}

fn poisoned() -> CounterError {
    CounterError::Unavailable("Mutex lock failed".to_string())
}

impl InMemorySlotCounter {
    /// Empty counter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, bypassing fault injection.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn value(&self, coupon_id: CouponId) -> Option<i64> {
        self.values.lock().unwrap().get(&coupon_id).copied()
    }

    /// Fault switches for this counter.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    async fn add(&self, coupon_id: CouponId, delta: i64) -> Result<i64, CounterError> {
        self.faults.check().await.map_err(CounterError::Unavailable)?;
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        let value = values.entry(coupon_id).or_insert(0);
        *value += delta;
        Ok(*value)
    }
}

impl SlotCounter for InMemorySlotCounter {
    fn decrement(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(CounterError::Unavailable)?;
            let mut values = self.values.lock().map_err(|_| poisoned())?;
            let value = values
                .get_mut(&coupon_id)
                .ok_or(CounterError::Unseeded(coupon_id))?;
            *value -= 1;
            Ok(*value)
        })
    }

    fn increment(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(self.add(coupon_id, 1))
    }

    fn set(&self, coupon_id: CouponId, value: i64) -> BoxFuture<'_, Result<(), CounterError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(CounterError::Unavailable)?;
            let mut values = self.values.lock().map_err(|_| poisoned())?;
            values.insert(coupon_id, value);
            Ok(())
        })
    }

    fn get(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<Option<i64>, CounterError>> {
        Box::pin(async move {
            self.faults.check().await.map_err(CounterError::Unavailable)?;
            let values = self.values.lock().map_err(|_| poisoned())?;
            Ok(values.get(&coupon_id).copied())
        })
    }
}
