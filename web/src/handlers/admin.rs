//! Operator endpoints: queue maintenance and reconciliation.

use crate::{error::AppError, state::AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use coupon_rush_core::types::CouponId;
use coupon_rush_runtime::{QueueStatus, RetryQueueChange, admin::DEFAULT_REQUEUE_LIMIT};
use serde::{Deserialize, Serialize};

/// `GET /api/admin/coupons/async/queues`
///
/// # Errors
///
/// `503` if the queues or the dead-letter table cannot be read.
pub async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, AppError> {
    Ok(Json(state.admin.status().await?))
}

/// Query string of a requeue request.
#[derive(Debug, Default, Deserialize)]
pub struct RequeueParams {
    /// Maximum entries to move. Defaults to 1000.
    pub limit: Option<u64>,
}

/// `POST /api/admin/coupons/async/retry/requeue?limit=N`
///
/// # Errors
///
/// `400` for a zero limit, `503` on queue failure.
pub async fn requeue_retry(
    State(state): State<AppState>,
    Query(params): Query<RequeueParams>,
) -> Result<Json<RetryQueueChange>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_REQUEUE_LIMIT);
    if limit == 0 {
        return Err(AppError::bad_request("limit must be positive"));
    }
    Ok(Json(state.admin.requeue_retry(limit).await?))
}

/// `DELETE /api/admin/coupons/async/retry`
///
/// # Errors
///
/// `503` on queue failure.
pub async fn clear_retry(State(state): State<AppState>) -> Result<Json<RetryQueueChange>, AppError> {
    Ok(Json(state.admin.clear_retry().await?))
}

/// Body of a limited-coupon registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInventoryRequest {
    /// Coupon to limit.
    pub coupon_id: i64,
    /// Slots per business day.
    pub daily_limit: i32,
}

/// Durable capacity of one coupon.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    /// Coupon id.
    pub coupon_id: CouponId,
    /// Slots per business day, when the body describes a registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<i32>,
    /// Remaining slots today.
    pub available_today: i32,
}

/// `POST /api/admin/coupons/inventory`
///
/// # Errors
///
/// `422` for a limit below 1, `503` on backend failure.
pub async fn register_inventory(
    State(state): State<AppState>,
    Json(request): Json<RegisterInventoryRequest>,
) -> Result<Json<InventoryResponse>, AppError> {
    let inventory = state
        .reconciliation
        .register_limited_coupon(CouponId::new(request.coupon_id), request.daily_limit)
        .await?;
    Ok(Json(InventoryResponse {
        coupon_id: inventory.coupon_id,
        daily_limit: Some(inventory.daily_limit),
        available_today: inventory.available_today,
    }))
}

/// `POST /api/admin/coupons/{couponId}/resync`
///
/// # Errors
///
/// `404` for a coupon without inventory, `503` on backend failure.
pub async fn resync_counter(
    State(state): State<AppState>,
    Path(coupon_id): Path<i64>,
) -> Result<Json<InventoryResponse>, AppError> {
    let coupon_id = CouponId::new(coupon_id);
    let available = state
        .reconciliation
        .resync_fast_path_counter(coupon_id)
        .await?
        .ok_or_else(|| AppError::not_found("Limited coupon", coupon_id))?;
    Ok(Json(InventoryResponse {
        coupon_id,
        daily_limit: None,
        available_today: available,
    }))
}

/// Result of an on-demand reset.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// Coupons replenished by this call.
    pub reset: u64,
}

/// `POST /api/admin/coupons/reset`
///
/// # Errors
///
/// `503` on backend failure.
pub async fn reset_capacities(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    let reset = state.reconciliation.daily_reset().await?;
    Ok(Json(ResetResponse { reset }))
}
