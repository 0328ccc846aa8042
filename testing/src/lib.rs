//! # Coupon Rush Testing
//!
//! Testing utilities for the Coupon Rush allocation engine.
//!
//! This crate provides:
//! - In-memory implementations of every provider trait in `coupon-rush-core`
//! - [`FaultSwitch`] to force outages, transient failures and latency
//! - [`FixedClock`] for deterministic "today"
//! - proptest strategies for capacity scenarios
//!
//! ## Example
//!
//! ```
//! use coupon_rush_core::inventory::InventoryStore;
//! use coupon_rush_core::types::CouponId;
//! use coupon_rush_core::environment::Clock;
//! use coupon_rush_testing::{test_clock, InMemoryInventoryStore};
//!
//! # tokio_test::block_on(async {
//! let clock = test_clock();
//! let store = InMemoryInventoryStore::new();
//! store.create(CouponId::new(1), 100, clock.today()).await.unwrap();
//!
//! store.faults().set_unavailable(true);
//! assert!(store.exists(CouponId::new(1)).await.is_err());
//! # });
//! ```

pub mod counter;
pub mod faults;
pub mod inventory;
pub mod issuance;
pub mod queue;

use chrono::{DateTime, Utc};
use coupon_rush_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::{Duration, FixedOffset, Offset};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`set`](Self::set) or
    /// [`advance`](Self::advance). Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use coupon_rush_testing::mocks::FixedClock;
    /// use coupon_rush_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let today = clock.today();
    /// clock.advance(Duration::days(1));
    /// assert_eq!(clock.today(), today.succ_opt().unwrap());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
        offset: FixedOffset,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
                offset: Utc.fix(),
            }
        }

        /// Use `offset` as the business-day timezone.
        #[must_use]
        pub const fn with_offset(mut self, offset: FixedOffset) -> Self {
            self.offset = offset;
            self
        }

        /// Move to `time`.
        #[allow(clippy::unwrap_used)] // Test mock: lock poisoning is a test failure
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Move forward by `by`.
        #[allow(clippy::unwrap_used)] // Test mock: lock poisoning is a test failure
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)] // Test mock: lock poisoning is a test failure
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }

        fn business_offset(&self) -> FixedOffset {
            self.offset
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// `(capacity, requests)` with `requests >= capacity`.
    pub fn oversubscribed() -> impl Strategy<Value = (i32, usize)> {
        (1..40i32).prop_flat_map(|capacity| {
            #[allow(clippy::cast_sign_loss)]
            let cap = capacity as usize;
            (Just(capacity), cap..cap * 4 + 1)
        })
    }
}

// Re-export commonly used items
pub use counter::InMemorySlotCounter;
pub use faults::FaultSwitch;
pub use inventory::InMemoryInventoryStore;
pub use issuance::{InMemoryClaimRegistry, InMemoryDeadLetterSink, InMemoryIssuanceRepository};
pub use mocks::{FixedClock, test_clock};
pub use queue::InMemoryIssuanceQueue;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, NaiveDate};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn clones_share_time() {
        let clock = test_clock();
        let other = clock.clone();
        clock.advance(Duration::hours(20));
        assert_eq!(other.today(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn offset_shifts_business_day() {
        let clock = test_clock().with_offset(FixedOffset::east_opt(16 * 3600).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }
}
