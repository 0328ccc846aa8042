//! `PostgreSQL` stores for Coupon Rush.
//!
//! This crate provides the durable side of the allocation engine on top of
//! sqlx:
//!
//! - [`PostgresInventoryStore`]: per-coupon daily capacity, the source of truth
//! - [`PostgresIssuanceRepository`]: issuance records, unique per `(user, coupon)`
//! - [`DeadLetterQueue`]: issuance entries that exhausted their retries
//!
//! All three share one connection pool. Run [`migrate`] once at startup.
//!
//! # Example
//!
//! ```no_run
//! use coupon_rush_postgres::{PostgresInventoryStore, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/coupons").await?;
//! migrate(&pool).await?;
//! let inventory = PostgresInventoryStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use coupon_rush_core::error::StoreError;
use sqlx::PgPool;

pub mod dead_letter_queue;
pub mod inventory;
pub mod issuance;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueue};
pub use inventory::PostgresInventoryStore;
pub use issuance::PostgresIssuanceRepository;

/// Apply the bundled migrations.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}
