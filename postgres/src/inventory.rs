//! `PostgreSQL` [`InventoryStore`].
//!
//! Every write folds the daily reset into the same statement: a row whose
//! `last_reset_date` is missing or before `today` is treated as holding
//! `daily_limit` slots. No statement can leave `available_today` negative;
//! the `available_within_limit` check constraint backs that up.

use chrono::NaiveDate;
use coupon_rush_core::BoxFuture;
use coupon_rush_core::error::StoreError;
use coupon_rush_core::inventory::{ConsumeOutcome, CouponInventory, InventoryStore};
use coupon_rush_core::types::CouponId;
use sqlx::PgPool;

type InventoryRow = (i64, i32, i32, Option<NaiveDate>);

fn to_inventory((coupon_id, daily_limit, available_today, last_reset_date): InventoryRow) -> CouponInventory {
    CouponInventory {
        coupon_id: CouponId::new(coupon_id),
        daily_limit,
        available_today,
        last_reset_date,
    }
}

/// `PostgreSQL` inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn exists(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let (exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM coupon_inventory WHERE coupon_id = $1)",
            )
            .bind(coupon_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to check inventory: {e}")))?;
            Ok(exists)
        })
    }

    fn find(
        &self,
        coupon_id: CouponId,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>> {
        Box::pin(async move {
            let row: Option<InventoryRow> = sqlx::query_as(
                "SELECT coupon_id, daily_limit, available_today, last_reset_date
                 FROM coupon_inventory
                 WHERE coupon_id = $1",
            )
            .bind(coupon_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to load inventory: {e}")))?;
            Ok(row.map(to_inventory))
        })
    }

    fn create(
        &self,
        coupon_id: CouponId,
        daily_limit: i32,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<CouponInventory, StoreError>> {
        Box::pin(async move {
            let row: InventoryRow = sqlx::query_as(
                "INSERT INTO coupon_inventory (coupon_id, daily_limit, available_today, last_reset_date)
                 VALUES ($1, $2, $2, $3)
                 ON CONFLICT (coupon_id) DO UPDATE
                 SET daily_limit = EXCLUDED.daily_limit,
                     available_today = EXCLUDED.available_today,
                     last_reset_date = EXCLUDED.last_reset_date,
                     updated_at = now()
                 RETURNING coupon_id, daily_limit, available_today, last_reset_date",
            )
            .bind(coupon_id.get())
            .bind(daily_limit)
            .bind(today)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to create inventory: {e}")))?;

            tracing::info!(coupon_id = %coupon_id, daily_limit, "Inventory created");
            Ok(to_inventory(row))
        })
    }

    fn conditional_decrement(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE coupon_inventory
                 SET available_today = (CASE
                         WHEN last_reset_date IS NULL OR last_reset_date < $2 THEN daily_limit
                         ELSE available_today
                     END) - 1,
                     last_reset_date = GREATEST(COALESCE(last_reset_date, $2), $2),
                     updated_at = now()
                 WHERE coupon_id = $1
                   AND (CASE
                         WHEN last_reset_date IS NULL OR last_reset_date < $2 THEN daily_limit
                         ELSE available_today
                     END) > 0",
            )
            .bind(coupon_id.get())
            .bind(today)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to decrement inventory: {e}")))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn consume_with_lock(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<ConsumeOutcome, StoreError>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to begin transaction: {e}")))?;

            let row: Option<InventoryRow> = sqlx::query_as(
                "SELECT coupon_id, daily_limit, available_today, last_reset_date
                 FROM coupon_inventory
                 WHERE coupon_id = $1
                 FOR UPDATE",
            )
            .bind(coupon_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to lock inventory: {e}")))?;

            // dropping `tx` on any early return rolls back and releases the lock
            let Some(row) = row else {
                return Ok(ConsumeOutcome::NotLimited);
            };

            let mut inventory = to_inventory(row);
            let reset = inventory.reset_if_needed(today);
            let consumed = inventory.consume_one();

            if reset || consumed {
                sqlx::query(
                    "UPDATE coupon_inventory
                     SET available_today = $2, last_reset_date = $3, updated_at = now()
                     WHERE coupon_id = $1",
                )
                .bind(coupon_id.get())
                .bind(inventory.available_today)
                .bind(inventory.last_reset_date)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to update inventory: {e}")))?;
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to commit transaction: {e}")))?;

            Ok(if consumed {
                ConsumeOutcome::Consumed
            } else {
                ConsumeOutcome::Exhausted
            })
        })
    }

    fn release_slot(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE coupon_inventory
                 SET available_today = LEAST(available_today + 1, daily_limit),
                     updated_at = now()
                 WHERE coupon_id = $1",
            )
            .bind(coupon_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to release slot: {e}")))?;
            Ok(())
        })
    }

    fn reset_all(&self, today: NaiveDate) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE coupon_inventory
                 SET available_today = daily_limit, last_reset_date = $1, updated_at = now()
                 WHERE last_reset_date IS NULL OR last_reset_date < $1",
            )
            .bind(today)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to reset inventories: {e}")))?;

            Ok(result.rows_affected())
        })
    }

    fn reset_if_needed(
        &self,
        coupon_id: CouponId,
        today: NaiveDate,
    ) -> BoxFuture<'_, Result<Option<CouponInventory>, StoreError>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE coupon_inventory
                 SET available_today = daily_limit, last_reset_date = $2, updated_at = now()
                 WHERE coupon_id = $1
                   AND (last_reset_date IS NULL OR last_reset_date < $2)",
            )
            .bind(coupon_id.get())
            .bind(today)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to reset inventory: {e}")))?;

            self.find(coupon_id).await
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<CouponInventory>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<InventoryRow> = sqlx::query_as(
                "SELECT coupon_id, daily_limit, available_today, last_reset_date
                 FROM coupon_inventory
                 ORDER BY coupon_id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to list inventories: {e}")))?;
            Ok(rows.into_iter().map(to_inventory).collect())
        })
    }
}
