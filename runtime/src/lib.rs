//! # Coupon Rush Runtime
//!
//! Runtime implementation for the Coupon Rush allocation engine.
//!
//! This crate wires the provider traits from `coupon-rush-core` into the
//! running system: the allocation decision, the background issuance worker
//! and the reconciliation jobs that keep the fast-path counter honest.
//!
//! ## Core Components
//!
//! - **SlotAllocator**: claim, decide (fast path or row-locked fallback), hand off
//! - **IssuanceWorker**: drains the issuance queues with bounded retry and dead-lettering
//! - **ReconciliationJob**: daily reset, counter resync and startup seeding
//! - **IssuanceAdmin**: queue inspection and retry-queue maintenance
//!
//! ## Example
//!
//! ```ignore
//! use coupon_rush_runtime::{Providers, SlotAllocator, AllocatorConfig};
//!
//! let allocator = SlotAllocator::new(providers.clone(), AllocatorConfig::default());
//!
//! match allocator.allocate(user_id, coupon_id).await? {
//!     AllocationOutcome::Issued { path } => { /* 200 */ }
//!     AllocationOutcome::SoldOut { .. } => { /* 409 */ }
//!     AllocationOutcome::Duplicate => { /* 409 */ }
//! }
//! ```

use coupon_rush_core::claims::ClaimRegistry;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::dead_letter::DeadLetterSink;
use coupon_rush_core::environment::Clock;
use coupon_rush_core::inventory::InventoryStore;
use coupon_rush_core::issuance::IssuanceRepository;
use coupon_rush_core::queue::IssuanceQueue;
use std::sync::Arc;

/// Queue inspection and retry-queue maintenance
pub mod admin;

/// Fast-path counter allocator
pub mod allocator;

/// Circuit breaker in front of the fast-path counter
pub mod breaker;

/// Row-locked fallback allocator
pub mod fallback;

/// Readiness probes
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Daily reset, counter resync and seeding
pub mod reconciliation;

/// Retry logic with exponential backoff
pub mod retry;

/// Allocation orchestration
pub mod service;

/// Background issuance worker
pub mod worker;

#[cfg(test)]
mod test_support;

/// Every external dependency the runtime talks to.
///
/// Production wires Postgres and Redis implementations; tests wire the
/// in-memory ones from `coupon-rush-testing`.
#[derive(Clone)]
pub struct Providers {
    /// Durable per-coupon capacity
    pub inventory: Arc<dyn InventoryStore>,
    /// Fast-path shared counter
    pub counter: Arc<dyn SlotCounter>,
    /// Issuance main and retry queues
    pub queue: Arc<dyn IssuanceQueue>,
    /// Durable issuance records
    pub issuances: Arc<dyn IssuanceRepository>,
    /// Duplicate-request registry
    pub claims: Arc<dyn ClaimRegistry>,
    /// Terminal store for exhausted issuance entries
    pub dead_letters: Arc<dyn DeadLetterSink>,
    /// Source of "now" and the business day
    pub clock: Arc<dyn Clock>,
}

pub use admin::{AdminError, IssuanceAdmin, QueueSettings, QueueStatus, RetryQueueChange};
pub use breaker::{BreakerConfig, FastPathBreaker};
pub use health::{HealthCheck, HealthProbe, HealthReport, HealthStatus};
pub use metrics::MetricsServer;
pub use reconciliation::{ReconciliationConfig, ReconciliationError, ReconciliationJob};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use service::{AllocatorConfig, SlotAllocator};
pub use worker::{DrainReport, IssuanceWorker, WorkerConfig};
