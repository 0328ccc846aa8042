//! HTTP surface of Coupon Rush.
//!
//! Handlers are thin: they translate JSON and paths into calls on the
//! runtime components held in [`AppState`] and map the results with
//! [`AppError`].
//!
//! # Routes
//!
//! ```text
//! POST   /api/coupons/:coupon_id/issue
//! GET    /api/admin/coupons/async/queues
//! POST   /api/admin/coupons/async/retry/requeue?limit=N
//! DELETE /api/admin/coupons/async/retry
//! POST   /api/admin/coupons/inventory
//! POST   /api/admin/coupons/:coupon_id/resync
//! POST   /api/admin/coupons/reset
//! GET    /health
//! GET    /ready
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::AppError;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let queue_admin = Router::new()
        .route("/queues", get(handlers::admin::queue_status))
        .route("/retry/requeue", post(handlers::admin::requeue_retry))
        .route("/retry", delete(handlers::admin::clear_retry));

    let coupon_admin = Router::new()
        .route("/inventory", post(handlers::admin::register_inventory))
        .route("/reset", post(handlers::admin::reset_capacities))
        .route("/:coupon_id/resync", post(handlers::admin::resync_counter))
        .nest("/async", queue_admin);

    Router::new()
        .route("/api/coupons/:coupon_id/issue", post(handlers::issue::issue_coupon))
        .nest("/api/admin/coupons", coupon_admin)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
