//! Circuit breaker guarding the fast-path counter.
//!
//! When the counter service is down every allocation would otherwise pay the
//! full fast-path timeout before falling back. The breaker counts
//! consecutive failures and, past a threshold, sends allocations straight to
//! the durable fallback for an open period.
//!
//! # States
//!
//! - **Closed**: fast path in use. Consecutive failures are counted.
//! - **Open**: fast path skipped until `open_duration` has elapsed.
//! - **HalfOpen**: exactly one probe call is let through. Success closes the
//!   breaker, failure re-opens it. Other callers keep bypassing meanwhile.
//!
//! # Example
//!
//! ```rust
//! use coupon_rush_runtime::breaker::{BreakerConfig, FastPathBreaker, State};
//!
//! # async fn example() {
//! let breaker = FastPathBreaker::new(BreakerConfig::builder().failure_threshold(2).build());
//!
//! assert!(breaker.try_acquire().await);
//! breaker.on_failure().await;
//! breaker.on_failure().await;
//!
//! assert_eq!(breaker.state().await, State::Open);
//! assert!(!breaker.try_acquire().await);
//! # }
//! ```

use crate::metrics::BreakerMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// How long to stay open before allowing a probe
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder {
            failure_threshold: None,
            open_duration: None,
        }
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Debug, Clone)]
pub struct BreakerConfigBuilder {
    failure_threshold: Option<u32>,
    open_duration: Option<Duration>,
}

impl BreakerConfigBuilder {
    /// Set the failure threshold.
    ///
    /// Circuit opens after this many consecutive failures.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Set how long the circuit stays open.
    #[must_use]
    pub const fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = Some(duration);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(5).max(1),
            open_duration: self.open_duration.unwrap_or(Duration::from_secs(10)),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Fast path in use
    Closed,
    /// Fast path bypassed
    Open,
    /// One probe allowed
    HalfOpen,
}

impl State {
    /// Gauge encoding: 0 = closed, 1 = half-open, 2 = open.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker for the fast-path counter.
///
/// Callers ask [`try_acquire`](Self::try_acquire) before using the fast path
/// and report the result with [`on_success`](Self::on_success) or
/// [`on_failure`](Self::on_failure).
#[derive(Debug, Clone)]
pub struct FastPathBreaker {
    config: Arc<BreakerConfig>,
    state: Arc<RwLock<BreakerState>>,
    total_rejections: Arc<AtomicU64>,
}

impl FastPathBreaker {
    /// Create a new breaker, initially closed.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(BreakerState {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            })),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the current state of the circuit breaker.
    pub async fn state(&self) -> State {
        self.state.read().await.state
    }

    /// Number of calls that bypassed the fast path because of the breaker.
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Whether the caller may use the fast path now.
    ///
    /// Transitions Open to `HalfOpen` once the open period has elapsed and
    /// grants that caller the single probe.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.write().await;

        let allowed = match state.state {
            State::Closed => true,
            State::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
            State::Open => {
                let elapsed = state
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.open_duration);
                if elapsed {
                    tracing::info!("Fast-path breaker transitioning OPEN -> HALF_OPEN");
                    state.state = State::HalfOpen;
                    state.probe_in_flight = true;
                    BreakerMetrics::record_state(State::HalfOpen);
                    true
                } else {
                    false
                }
            }
        };

        if !allowed {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            BreakerMetrics::record_rejection();
        }
        allowed
    }

    /// Report a successful fast-path call.
    pub async fn on_success(&self) {
        let mut state = self.state.write().await;
        state.consecutive_failures = 0;
        if state.state != State::Closed {
            tracing::info!("Fast-path breaker transitioning {:?} -> CLOSED", state.state);
            state.state = State::Closed;
            state.opened_at = None;
            state.probe_in_flight = false;
            BreakerMetrics::record_state(State::Closed);
        }
    }

    /// Report a failed fast-path call (timeout or connection error).
    pub async fn on_failure(&self) {
        let mut state = self.state.write().await;
        BreakerMetrics::record_failure();

        match state.state {
            State::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = state.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Fast-path breaker transitioning CLOSED -> OPEN"
                    );
                    state.state = State::Open;
                    state.opened_at = Some(Instant::now());
                    BreakerMetrics::record_state(State::Open);
                }
            }
            State::HalfOpen => {
                tracing::warn!("Fast-path breaker transitioning HALF_OPEN -> OPEN (probe failed)");
                state.state = State::Open;
                state.opened_at = Some(Instant::now());
                state.probe_in_flight = false;
                BreakerMetrics::record_state(State::Open);
            }
            State::Open => {
                state.consecutive_failures += 1;
            }
        }
    }

    /// Reset the breaker to closed state.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        tracing::info!("Fast-path breaker manually reset to CLOSED");
        state.state = State::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.probe_in_flight = false;
        BreakerMetrics::record_state(State::Closed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open: Duration) -> FastPathBreaker {
        FastPathBreaker::new(
            BreakerConfig::builder()
                .failure_threshold(threshold)
                .open_duration(open)
                .build(),
        )
    }

    #[tokio::test]
    async fn opens_after_threshold() {
        let breaker = breaker(3, Duration::from_secs(60));
        for _ in 0..2 {
            assert!(breaker.try_acquire().await);
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, State::Closed);

        breaker.on_failure().await;
        assert_eq!(breaker.state().await, State::Open);
        assert!(!breaker.try_acquire().await);
        assert_eq!(breaker.rejections(), 1);
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let breaker = breaker(2, Duration::from_secs(60));
        breaker.on_failure().await;
        breaker.on_success().await;
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn half_open_allows_single_probe() {
        let breaker = breaker(1, Duration::from_millis(20));
        breaker.on_failure().await;
        assert!(!breaker.try_acquire().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.try_acquire().await);
        assert_eq!(breaker.state().await, State::HalfOpen);
        assert!(!breaker.try_acquire().await, "second caller must bypass");

        breaker.on_success().await;
        assert_eq!(breaker.state().await, State::Closed);
        assert!(breaker.try_acquire().await);
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let breaker = breaker(1, Duration::from_millis(20));
        breaker.on_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(breaker.try_acquire().await);
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, State::Open);
        assert!(!breaker.try_acquire().await);
    }

    #[tokio::test]
    async fn reset_closes() {
        let breaker = breaker(1, Duration::from_secs(60));
        breaker.on_failure().await;
        breaker.reset().await;
        assert_eq!(breaker.state().await, State::Closed);
    }
}
