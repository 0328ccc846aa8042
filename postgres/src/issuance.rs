//! `PostgreSQL` [`IssuanceRepository`].

use coupon_rush_core::BoxFuture;
use coupon_rush_core::error::StoreError;
use coupon_rush_core::issuance::{InsertOutcome, IssuanceRecord, IssuanceRepository};
use coupon_rush_core::types::{CouponId, UserId};
use sqlx::PgPool;

/// Issuance records in `coupon_issuances`.
///
/// The `(user_id, coupon_id)` unique constraint is the final guard against
/// duplicate issuance; a conflicting insert reports
/// [`InsertOutcome::AlreadyIssued`].
#[derive(Clone)]
pub struct PostgresIssuanceRepository {
    pool: PgPool,
}

impl PostgresIssuanceRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IssuanceRepository for PostgresIssuanceRepository {
    fn insert_if_absent(
        &self,
        record: IssuanceRecord,
    ) -> BoxFuture<'_, Result<InsertOutcome, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO coupon_issuances (user_id, coupon_id, issued_at, expires_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (user_id, coupon_id) DO NOTHING",
            )
            .bind(record.user_id.get())
            .bind(record.coupon_id.get())
            .bind(record.issued_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to insert issuance: {e}")))?;

            Ok(if result.rows_affected() == 1 {
                InsertOutcome::Inserted
            } else {
                InsertOutcome::AlreadyIssued
            })
        })
    }

    fn exists(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let (exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(
                     SELECT 1 FROM coupon_issuances WHERE user_id = $1 AND coupon_id = $2
                 )",
            )
            .bind(user_id.get())
            .bind(coupon_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to check issuance: {e}")))?;
            Ok(exists)
        })
    }

    fn count_for_coupon(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM coupon_issuances WHERE coupon_id = $1")
                    .bind(coupon_id.get())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| StoreError::Database(format!("Failed to count issuances: {e}")))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}
