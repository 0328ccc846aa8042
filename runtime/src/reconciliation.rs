//! Reconciliation: daily capacity reset, fast-path counter resync and
//! startup seeding.
//!
//! The durable inventory is the source of truth. Every operation here reads
//! it and overwrites the shared counter with `available_today`, discarding
//! whatever drift the counter accumulated.
//!
//! A resync racing in-flight fast-path grants may briefly leave the counter
//! above the durable value. Those grants are still confirmed by the
//! conditional durable decrement, so the counter can over-admit attempts but
//! never slots.

use crate::Providers;
use crate::metrics::ReconciliationMetrics;
use coupon_rush_core::error::{CounterError, StoreError};
use coupon_rush_core::inventory::CouponInventory;
use coupon_rush_core::types::CouponId;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, warn};

/// Reconciliation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    /// The durable store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The fast-path counter could not be written.
    #[error("Counter error: {0}")]
    Counter(#[from] CounterError),

    /// A limited coupon needs at least one slot per day.
    #[error("Daily limit must be positive, got {0}")]
    InvalidDailyLimit(i32),
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// Period of the full counter resync
    pub resync_interval: Duration,
    /// Delay after midnight before the daily reset runs
    pub reset_grace: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            reset_grace: Duration::from_millis(500),
        }
    }
}

/// Capacity reset and counter resync over the configured providers.
pub struct ReconciliationJob {
    providers: Providers,
    config: ReconciliationConfig,
}

impl ReconciliationJob {
    /// Create a job.
    #[must_use]
    pub const fn new(providers: Providers, config: ReconciliationConfig) -> Self {
        Self { providers, config }
    }

    /// Replenish every coupon whose last reset is before `today`.
    ///
    /// Idempotent: a second call on the same day replenishes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::Store`] if the reset failed.
    pub async fn reset_all_capacities(&self, today: NaiveDate) -> Result<u64, ReconciliationError> {
        let reset = self.providers.inventory.reset_all(today).await?;
        ReconciliationMetrics::record_reset(reset);
        info!(%today, reset, "Daily capacities reset");
        Ok(reset)
    }

    /// Overwrite the counter of `coupon_id` with the durable availability.
    ///
    /// Returns the value written, or `None` for a coupon that is not limited.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError`] if either side failed.
    pub async fn resync_fast_path_counter(
        &self,
        coupon_id: CouponId,
    ) -> Result<Option<i32>, ReconciliationError> {
        let today = self.providers.clock.today();
        let Some(inventory) = self.providers.inventory.reset_if_needed(coupon_id, today).await?
        else {
            return Ok(None);
        };
        self.write_counter(&inventory).await?;
        Ok(Some(inventory.available_today))
    }

    /// Seed the counter of every limited coupon from the durable store.
    ///
    /// Due resets are applied first so no counter starts from yesterday's
    /// leftovers. Returns how many counters were written.
    ///
    /// # Errors
    ///
    /// Returns the first failure; counters already written stay written.
    pub async fn initialize_all_counters(&self) -> Result<usize, ReconciliationError> {
        let today = self.providers.clock.today();
        self.providers.inventory.reset_all(today).await?;
        let inventories = self.providers.inventory.list_all().await?;
        for inventory in &inventories {
            self.write_counter(inventory).await?;
        }
        info!(count = inventories.len(), "Fast-path counters initialized");
        Ok(inventories.len())
    }

    /// Resync every limited coupon, skipping the ones whose counter write
    /// fails. Returns how many were resynced.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::Store`] if the inventories could not be
    /// listed.
    pub async fn resync_all(&self) -> Result<usize, ReconciliationError> {
        let inventories = self.providers.inventory.list_all().await?;
        let mut synced = 0;
        for inventory in inventories {
            match self.resync_fast_path_counter(inventory.coupon_id).await {
                Ok(Some(_)) => synced += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(coupon_id = %inventory.coupon_id, error = %e, "Counter resync failed");
                }
            }
        }
        debug!(synced, "Fast-path counters resynced");
        Ok(synced)
    }

    /// Start-of-day job: reset capacities, then reseed every counter.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError`] if either step failed.
    pub async fn daily_reset(&self) -> Result<u64, ReconciliationError> {
        let reset = self
            .reset_all_capacities(self.providers.clock.today())
            .await?;
        self.initialize_all_counters().await?;
        Ok(reset)
    }

    /// Mark `coupon_id` as limited to `daily_limit` slots per day and seed
    /// its counter.
    ///
    /// # Errors
    ///
    /// - [`ReconciliationError::InvalidDailyLimit`] for a limit below 1.
    /// - [`ReconciliationError::Store`] or [`ReconciliationError::Counter`] on
    ///   backend failure. A counter failure leaves the durable row in place
    ///   and the next resync seeds it.
    pub async fn register_limited_coupon(
        &self,
        coupon_id: CouponId,
        daily_limit: i32,
    ) -> Result<CouponInventory, ReconciliationError> {
        if daily_limit <= 0 {
            return Err(ReconciliationError::InvalidDailyLimit(daily_limit));
        }
        let today = self.providers.clock.today();
        let inventory = self
            .providers
            .inventory
            .create(coupon_id, daily_limit, today)
            .await?;
        self.write_counter(&inventory).await?;
        info!(coupon_id = %coupon_id, daily_limit, "Limited coupon registered");
        Ok(inventory)
    }

    async fn write_counter(&self, inventory: &CouponInventory) -> Result<(), ReconciliationError> {
        let target = i64::from(inventory.available_today);
        match self.providers.counter.get(inventory.coupon_id).await {
            Ok(Some(current)) if current != target => {
                ReconciliationMetrics::record_drift();
                warn!(
                    coupon_id = %inventory.coupon_id,
                    counter = current,
                    durable = target,
                    "Fast-path counter drift corrected"
                );
            }
            Ok(_) => {}
            Err(e) => debug!(coupon_id = %inventory.coupon_id, error = %e, "Counter read failed"),
        }
        self.providers.counter.set(inventory.coupon_id, target).await?;
        ReconciliationMetrics::record_resync();
        Ok(())
    }

    /// Run the daily reset at each business-day boundary and [`resync_all`]
    /// every `resync_interval`, until a shutdown signal arrives.
    ///
    /// [`resync_all`]: Self::resync_all
    #[must_use]
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.resync_interval;
            let mut resync = interval_at(Instant::now() + period, period);
            resync.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let daily = sleep(self.until_next_reset());
            tokio::pin!(daily);

            info!(
                resync_secs = period.as_secs(),
                "Reconciliation scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Reconciliation scheduler received shutdown signal");
                        break;
                    }
                    () = &mut daily => {
                        if let Err(e) = self.daily_reset().await {
                            error!(error = %e, "Daily reset failed");
                        }
                        daily.as_mut().reset(Instant::now() + self.until_next_reset());
                    }
                    _ = resync.tick() => {
                        if let Err(e) = self.resync_all().await {
                            warn!(error = %e, "Periodic resync failed");
                        }
                    }
                }
            }
        })
    }

    fn until_next_reset(&self) -> Duration {
        self.providers
            .clock
            .until_next_day()
            .to_std()
            .unwrap_or(Duration::ZERO)
            + self.config.reset_grace
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use coupon_rush_core::counter::SlotCounter;
    use coupon_rush_core::inventory::InventoryStore;

    const COUPON: CouponId = CouponId::new(5);

    fn job(h: &Harness) -> ReconciliationJob {
        ReconciliationJob::new(h.providers(), ReconciliationConfig::default())
    }

    #[tokio::test]
    async fn reset_is_idempotent_within_a_day() {
        let h = Harness::with_limited(COUPON, 10).await;
        let mut drained = h.inventory.snapshot(COUPON).unwrap();
        drained.available_today = 0;
        drained.last_reset_date = h.today().pred_opt();
        h.inventory.insert(drained);

        let job = job(&h);
        assert_eq!(job.reset_all_capacities(h.today()).await.unwrap(), 1);
        let after = h.inventory.snapshot(COUPON).unwrap();
        assert_eq!(after.available_today, 10);
        assert_eq!(after.last_reset_date, Some(h.today()));

        assert_eq!(job.reset_all_capacities(h.today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resync_overwrites_stale_counter() {
        let h = Harness::with_limited(COUPON, 30).await;
        h.counter.set(COUPON, 50).await.unwrap();

        let written = job(&h).resync_fast_path_counter(COUPON).await.unwrap();
        assert_eq!(written, Some(30));
        assert_eq!(h.counter.value(COUPON), Some(30));
    }

    #[tokio::test]
    async fn resync_of_unlimited_coupon_is_noop() {
        let h = Harness::new();
        assert_eq!(job(&h).resync_fast_path_counter(COUPON).await.unwrap(), None);
        assert_eq!(h.counter.value(COUPON), None);
    }

    #[tokio::test]
    async fn initialize_seeds_every_coupon_after_due_reset() {
        let h = Harness::new();
        h.inventory
            .create(CouponId::new(1), 3, h.today())
            .await
            .unwrap();
        let mut stale = CouponInventory::new(CouponId::new(2), 7, h.today());
        stale.available_today = 1;
        stale.last_reset_date = h.today().pred_opt();
        h.inventory.insert(stale);

        assert_eq!(job(&h).initialize_all_counters().await.unwrap(), 2);
        assert_eq!(h.counter.value(CouponId::new(1)), Some(3));
        assert_eq!(h.counter.value(CouponId::new(2)), Some(7));
    }

    #[tokio::test]
    async fn initialize_fails_while_counter_is_down() {
        let h = Harness::with_limited(COUPON, 3).await;
        h.counter.faults().set_unavailable(true);
        let err = job(&h).initialize_all_counters().await.unwrap_err();
        assert!(matches!(err, ReconciliationError::Counter(_)));
    }

    #[tokio::test]
    async fn resync_all_skips_failed_writes() {
        let h = Harness::with_limited(COUPON, 3).await;
        h.inventory
            .create(CouponId::new(6), 4, h.today())
            .await
            .unwrap();
        h.counter.faults().fail_next(2);

        // first coupon: the drift read and the write both fail
        assert_eq!(job(&h).resync_all().await.unwrap(), 1);
        assert_eq!(h.counter.value(CouponId::new(6)), Some(4));
    }

    #[tokio::test]
    async fn resync_after_grants_does_not_hand_out_capacity_twice() {
        let h = Harness::with_limited(COUPON, 2).await;
        let allocator = h.allocator();
        for user in 0..2 {
            assert!(allocator.allocate(coupon_rush_core::types::UserId::new(user), COUPON).await.unwrap().is_issued());
        }

        job(&h).resync_all().await.unwrap();
        assert_eq!(h.counter.value(COUPON), Some(0));

        for user in 2..4 {
            assert!(!allocator.allocate(coupon_rush_core::types::UserId::new(user), COUPON).await.unwrap().is_issued());
        }
        assert_eq!(h.queue.main_entries().len(), 2);
    }

    #[tokio::test]
    async fn daily_reset_reseeds_counters() {
        let h = Harness::with_limited(COUPON, 4).await;
        let allocator = h.allocator();
        for user in 0..4 {
            allocator
                .allocate(coupon_rush_core::types::UserId::new(user), COUPON)
                .await
                .unwrap();
        }
        assert_eq!(h.inventory.snapshot(COUPON).unwrap().available_today, 0);

        h.clock.advance(chrono::Duration::days(1));
        assert_eq!(job(&h).daily_reset().await.unwrap(), 1);
        assert_eq!(h.inventory.snapshot(COUPON).unwrap().available_today, 4);
        assert_eq!(h.counter.value(COUPON), Some(4));
    }

    #[tokio::test]
    async fn register_validates_and_seeds() {
        let h = Harness::new();
        let job = job(&h);
        assert_eq!(
            job.register_limited_coupon(COUPON, 0).await.unwrap_err(),
            ReconciliationError::InvalidDailyLimit(0)
        );

        let inventory = job.register_limited_coupon(COUPON, 25).await.unwrap();
        assert_eq!(inventory.available_today, 25);
        assert!(h.inventory.exists(COUPON).await.unwrap());
        assert_eq!(h.counter.value(COUPON), Some(25));
    }

    #[tokio::test]
    async fn scheduler_stops_on_shutdown() {
        let h = Harness::with_limited(COUPON, 3).await;
        let (tx, rx) = broadcast::channel(1);
        let handle = Arc::new(job(&h)).spawn(rx);
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
