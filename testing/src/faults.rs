//! Fault injection shared by the in-memory providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct FaultState {
    unavailable: AtomicBool,
    fail_next: AtomicU32,
    latency_ms: AtomicU64,
}

/// Switchboard controlling how a provider misbehaves.
///
/// Cloning shares the switches, so a test keeps a handle while the provider
/// sits behind an `Arc<dyn Trait>`.
///
/// # Example
///
/// ```
/// use coupon_rush_testing::FaultSwitch;
///
/// # tokio_test::block_on(async {
/// let faults = FaultSwitch::new();
/// faults.fail_next(1);
/// assert!(faults.check().await.is_err());
/// assert!(faults.check().await.is_ok());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    state: Arc<FaultState>,
}

impl FaultSwitch {
    /// All switches off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, then recover.
    pub fn fail_next(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_latency(&self, latency: Duration) {
        self.state
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Whether the provider is currently forced down.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.state.unavailable.load(Ordering::SeqCst)
    }

    /// Apply the configured latency and report an injected failure, if any.
    ///
    /// # Errors
    ///
    /// Returns a description of the injected failure.
    pub async fn check(&self) -> Result<(), String> {
        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_unavailable() {
            return Err("injected outage".to_string());
        }
        let consumed = self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err("injected failure".to_string());
        }
        Ok(())
    }
}
