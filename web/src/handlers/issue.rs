//! Coupon issuance endpoint.

use crate::{error::AppError, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
};
use coupon_rush_core::types::{AllocationOutcome, CouponId, UserId};
use serde::{Deserialize, Serialize};

/// Body of an issuance request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    /// Requesting user.
    pub user_id: i64,
}

/// Body returned for a granted request.
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    /// Always `ISSUED`.
    pub status: &'static str,
    /// Allocation path that granted the slot.
    pub path: &'static str,
}

/// Claim one of today's slots for a coupon.
///
/// ```text
/// POST /api/coupons/{couponId}/issue   { "userId": 42 }
/// ```
///
/// # Errors
///
/// `409 SOLD_OUT` when capacity is exhausted, `409 ALREADY_ISSUED` for a
/// repeat request, `503` when the allocation backends failed.
pub async fn issue_coupon(
    State(state): State<AppState>,
    Path(coupon_id): Path<i64>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, AppError> {
    let coupon_id = CouponId::new(coupon_id);
    let user_id = UserId::new(request.user_id);

    match state.allocator.allocate(user_id, coupon_id).await? {
        AllocationOutcome::Issued { path } => {
            tracing::debug!(coupon_id = %coupon_id, user_id = %user_id, path = %path, "Coupon issued");
            Ok(Json(IssueResponse {
                status: "ISSUED",
                path: path.as_str(),
            }))
        }
        AllocationOutcome::SoldOut { .. } => Err(AppError::sold_out()),
        AllocationOutcome::Duplicate => Err(AppError::already_issued()),
    }
}
