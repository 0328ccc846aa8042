//! Application state for Axum handlers.

use coupon_rush_runtime::{HealthProbe, IssuanceAdmin, ReconciliationJob, SlotAllocator};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Every field is cheap to clone; Axum clones the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Allocation entry point
    pub allocator: Arc<SlotAllocator>,
    /// Reset, resync and coupon registration
    pub reconciliation: Arc<ReconciliationJob>,
    /// Queue inspection and maintenance
    pub admin: IssuanceAdmin,
    /// Dependencies checked by the readiness endpoint
    pub probes: Arc<[Arc<dyn HealthProbe>]>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        allocator: Arc<SlotAllocator>,
        reconciliation: Arc<ReconciliationJob>,
        admin: IssuanceAdmin,
        probes: Vec<Arc<dyn HealthProbe>>,
    ) -> Self {
        Self {
            allocator,
            reconciliation,
            admin,
            probes: probes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
