//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the allocation engine:
//! - Slot decisions per path and allocation latency
//! - Fast-path breaker state and failures
//! - Issuance queue depths and worker outcomes
//! - Reconciliation resets, resyncs and drift corrections
//!
//! # Example
//!
//! ```rust,no_run
//! use coupon_rush_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use crate::breaker::State;
use coupon_rush_core::types::{AllocationPath, Decision};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder and renderer.
///
/// Installs the global recorder; the server binary exposes [`render`](Self::render)
/// over HTTP for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint will bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint binds to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Allocation
    describe_counter!(
        "coupon_slot_decisions_total",
        "Slot decisions by path (fast_path, fallback, unlimited) and outcome"
    );
    describe_counter!(
        "coupon_duplicate_requests_total",
        "Requests rejected because the user already claimed the coupon"
    );
    describe_counter!(
        "coupon_allocation_errors_total",
        "Allocations that failed with an infrastructure error"
    );
    describe_histogram!(
        "coupon_allocation_duration_seconds",
        "End-to-end allocation latency"
    );
    describe_counter!(
        "coupon_fast_path_failures_total",
        "Fast-path counter calls that timed out or failed"
    );
    describe_counter!(
        "coupon_slot_compensations_total",
        "Granted slots returned because they could not be handed to issuance"
    );

    // Breaker
    describe_gauge!(
        "coupon_fast_path_breaker_state",
        "Fast-path breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "coupon_fast_path_breaker_failures_total",
        "Failures reported to the fast-path breaker"
    );
    describe_counter!(
        "coupon_fast_path_breaker_rejections_total",
        "Allocations that bypassed the fast path because the breaker was open"
    );

    // Issuance
    describe_gauge!("coupon_issue_queue_size", "Entries waiting in the main queue");
    describe_gauge!("coupon_issue_retry_size", "Entries waiting in the retry queue");
    describe_counter!(
        "coupon_issue_persisted_total",
        "Issuance records written by the worker"
    );
    describe_counter!(
        "coupon_issue_duplicates_total",
        "Queue entries whose record already existed"
    );
    describe_counter!(
        "coupon_issue_retried_total",
        "Queue entries routed to the retry queue"
    );
    describe_counter!(
        "coupon_issue_dead_lettered_total",
        "Queue entries moved to the dead-letter table"
    );
    describe_counter!(
        "coupon_issue_requeued_total",
        "Retry entries moved back to the main queue by operators"
    );

    // Reconciliation
    describe_counter!(
        "coupon_inventory_resets_total",
        "Inventories replenished by the daily reset"
    );
    describe_counter!(
        "coupon_counter_resyncs_total",
        "Fast-path counters overwritten from the durable store"
    );
    describe_counter!(
        "coupon_counter_drift_total",
        "Fast-path grants rejected by the durable store"
    );
}

/// Allocation metrics recorder.
pub struct AllocationMetrics;

impl AllocationMetrics {
    /// Record a slot decision.
    pub fn record_decision(path: AllocationPath, decision: Decision) {
        let outcome = if decision.is_granted() { "granted" } else { "denied" };
        counter!("coupon_slot_decisions_total", "path" => path.as_str(), "outcome" => outcome)
            .increment(1);
    }

    /// Record a duplicate request.
    pub fn record_duplicate() {
        counter!("coupon_duplicate_requests_total").increment(1);
    }

    /// Record an allocation that failed.
    pub fn record_error() {
        counter!("coupon_allocation_errors_total").increment(1);
    }

    /// Record allocation latency.
    pub fn record_duration(duration: Duration) {
        histogram!("coupon_allocation_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a fast-path failure.
    pub fn record_fast_path_failure(kind: &'static str) {
        counter!("coupon_fast_path_failures_total", "kind" => kind).increment(1);
    }

    /// Record a returned slot.
    pub fn record_compensation() {
        counter!("coupon_slot_compensations_total").increment(1);
    }
}

/// Fast-path breaker metrics recorder.
pub struct BreakerMetrics;

impl BreakerMetrics {
    /// Record breaker state.
    pub fn record_state(state: State) {
        gauge!("coupon_fast_path_breaker_state").set(state.as_gauge());
    }

    /// Record a failure.
    pub fn record_failure() {
        counter!("coupon_fast_path_breaker_failures_total").increment(1);
    }

    /// Record a bypassed call.
    pub fn record_rejection() {
        counter!("coupon_fast_path_breaker_rejections_total").increment(1);
    }
}

/// Issuance metrics recorder.
pub struct IssuanceMetrics;

impl IssuanceMetrics {
    /// Record queue depths.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_depths(queue_size: u64, retry_size: u64) {
        gauge!("coupon_issue_queue_size").set(queue_size as f64);
        gauge!("coupon_issue_retry_size").set(retry_size as f64);
    }

    /// Record a persisted record.
    pub fn record_persisted() {
        counter!("coupon_issue_persisted_total").increment(1);
    }

    /// Record a duplicate entry.
    pub fn record_duplicate() {
        counter!("coupon_issue_duplicates_total").increment(1);
    }

    /// Record a retry routing.
    pub fn record_retried() {
        counter!("coupon_issue_retried_total").increment(1);
    }

    /// Record a dead letter.
    pub fn record_dead_lettered() {
        counter!("coupon_issue_dead_lettered_total").increment(1);
    }

    /// Record a manual requeue.
    pub fn record_requeued(count: u64) {
        counter!("coupon_issue_requeued_total").increment(count);
    }
}

/// Reconciliation metrics recorder.
pub struct ReconciliationMetrics;

impl ReconciliationMetrics {
    /// Record a daily reset.
    pub fn record_reset(count: u64) {
        counter!("coupon_inventory_resets_total").increment(count);
    }

    /// Record a counter resync.
    pub fn record_resync() {
        counter!("coupon_counter_resyncs_total").increment(1);
    }

    /// Record a drift correction.
    pub fn record_drift() {
        counter!("coupon_counter_drift_total").increment(1);
    }
}
