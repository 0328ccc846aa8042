//! # Coupon Rush Core
//!
//! Core types and provider traits for a limited-quantity coupon allocation
//! engine ("first-come-first-served" daily slots).
//!
//! This crate contains no I/O. It defines:
//!
//! - **Domain types**: [`types::CouponId`], [`types::UserId`], [`types::Decision`]
//! - **Durable capacity state**: [`inventory::CouponInventory`] and the
//!   [`inventory::InventoryStore`] trait (single source of truth)
//! - **Fast path**: the [`counter::SlotCounter`] trait (shared atomic counter)
//! - **Issuance pipeline**: [`queue::IssuanceQueueEntry`], [`queue::IssuanceQueue`],
//!   [`issuance::IssuanceRepository`], [`dead_letter::DeadLetterSink`]
//! - **Duplicate pre-check**: [`claims::ClaimRegistry`]
//! - **Error taxonomy**: [`error`]
//!
//! # Architecture
//!
//! ```text
//!   request ──► SlotCounter::decrement ──► post-decrement >= 0 ? ──► grant ──► IssuanceQueue
//!                    │ (timeout / unreachable)                                    │
//!                    ▼                                                            ▼
//!   InventoryStore::consume_with_lock (row lock)                    worker ──► IssuanceRepository
//!                                                                                 │ (failure)
//!                                                                                 ▼
//!                                                                   retry queue ──► dead letter
//! ```
//!
//! Implementations live in sibling crates:
//!
//! - `coupon-rush-postgres`: durable inventory, issuance records, dead letters
//! - `coupon-rush-redis`: fast-path counter, queues, claim sets
//! - `coupon-rush-testing`: in-memory fakes for every trait
//!
//! # Dyn Compatibility
//!
//! Provider traits return `Pin<Box<dyn Future>>` instead of using `async fn`
//! so that the runtime can hold them as `Arc<dyn Trait>` and swap
//! implementations (production, in-memory, fault-injecting) without
//! threading generic parameters through every component.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod counter;
pub mod dead_letter;
pub mod error;
pub mod inventory;
pub mod issuance;
pub mod queue;
pub mod types;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by provider traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment traits for dependency injection.
///
/// Components never read the system clock directly; they go through
/// [`environment::Clock`] so tests can pin "today" and drive daily resets.
pub mod environment {
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Example
    ///
    /// ```
    /// use coupon_rush_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock::default();
    /// let today = clock.today();
    /// assert!(today <= clock.now().date_naive().succ_opt().unwrap_or(today));
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Offset of the business day relative to UTC.
        ///
        /// Daily capacity is replenished when the calendar date in this
        /// offset changes. Defaults to UTC.
        fn business_offset(&self) -> FixedOffset {
            Utc.fix()
        }

        /// Current calendar date of the business day.
        fn today(&self) -> NaiveDate {
            self.now().with_timezone(&self.business_offset()).date_naive()
        }

        /// Time remaining until the next business day starts.
        fn until_next_day(&self) -> Duration {
            let now = self.now().with_timezone(&self.business_offset());
            let next_midnight = now
                .date_naive()
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive - now.naive_local());
            next_midnight.unwrap_or_else(|| Duration::hours(24))
        }
    }

    /// Production clock reading the system time.
    #[derive(Debug, Clone, Copy)]
    pub struct SystemClock {
        offset: FixedOffset,
    }

    impl SystemClock {
        /// Create a clock whose business day starts at midnight in `offset`.
        #[must_use]
        pub const fn with_offset(offset: FixedOffset) -> Self {
            Self { offset }
        }
    }

    impl Default for SystemClock {
        fn default() -> Self {
            Self {
                offset: Utc.fix(),
            }
        }
    }

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn business_offset(&self) -> FixedOffset {
            self.offset
        }
    }
}

// Re-export commonly used items
pub use claims::ClaimRegistry;
pub use counter::SlotCounter;
pub use dead_letter::{DeadLetterSink, FailedIssuance};
pub use environment::{Clock, SystemClock};
pub use error::{AllocationError, CounterError, QueueError, StoreError};
pub use inventory::{ConsumeOutcome, CouponInventory, InventoryStore};
pub use issuance::{InsertOutcome, IssuanceRecord, IssuanceRepository};
pub use queue::{IssuanceQueue, IssuanceQueueEntry};
pub use types::{AllocationOutcome, AllocationPath, CouponId, Decision, UserId};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::environment::Clock;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    struct At(DateTime<Utc>, FixedOffset);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }

        fn business_offset(&self) -> FixedOffset {
            self.1
        }
    }

    #[test]
    fn today_follows_business_offset() {
        // 2025-03-01 20:00 UTC is already 2025-03-02 in UTC+9
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        let utc = At(now, FixedOffset::east_opt(0).unwrap());
        let seoul = At(now, FixedOffset::east_opt(9 * 3600).unwrap());

        assert_eq!(utc.today(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(seoul.today(), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn until_next_day_counts_to_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 22, 30, 0).unwrap();
        let clock = At(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(clock.until_next_day(), Duration::minutes(90));
    }
}
