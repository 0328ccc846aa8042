//! Error types for web handlers.
//!
//! [`AppError`] bridges domain errors and HTTP responses. Capacity
//! exhaustion and duplicate requests are outcomes in the domain, but the
//! HTTP contract reports them as `409` with a distinguishing `code`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use coupon_rush_core::error::AllocationError;
use coupon_rush_runtime::{AdminError, ReconciliationError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<Data>, AppError> {
///     let status = state.admin.status().await?;
///     Ok(Json(status))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 error for a coupon with no slots left today.
    #[must_use]
    pub fn sold_out() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "No slots left for today".to_string(),
            "SOLD_OUT".to_string(),
        )
    }

    /// Create a 409 error for a user who already holds the coupon.
    #[must_use]
    pub fn already_issued() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "Coupon already issued to this user".to_string(),
            "ALREADY_ISSUED".to_string(),
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::CouponNotFound(coupon_id) => Self::not_found("Coupon", coupon_id),
            other => Self::unavailable("Coupon issuance is temporarily unavailable")
                .with_source(anyhow::Error::new(other)),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        Self::unavailable("Issuance queues are unavailable").with_source(anyhow::Error::new(err))
    }
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        match err {
            ReconciliationError::InvalidDailyLimit(limit) => {
                Self::validation(format!("dailyLimit must be at least 1, got {limit}"))
            }
            other => Self::unavailable("Reconciliation failed").with_source(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coupon_rush_core::error::{QueueError, StoreError};
    use coupon_rush_core::types::CouponId;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Coupon", "123");
        assert_eq!(err.to_string(), "[NOT_FOUND] Coupon with id 123 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_outcome_conflicts() {
        assert_eq!(AppError::sold_out().status(), StatusCode::CONFLICT);
        assert_eq!(AppError::sold_out().code(), "SOLD_OUT");
        assert_eq!(AppError::already_issued().code(), "ALREADY_ISSUED");
    }

    #[test]
    fn test_allocation_failures_are_unavailable() {
        let err: AppError = AllocationError::Queue(QueueError::Unavailable("refused".into())).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(std::error::Error::source(&err).is_some());

        let err: AppError = AllocationError::CouponNotFound(CouponId::new(4)).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_limit_is_validation() {
        let err: AppError = ReconciliationError::InvalidDailyLimit(0).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err: AppError =
            ReconciliationError::Store(StoreError::Database("down".into())).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
