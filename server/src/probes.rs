//! Readiness probes for the backing services.

use coupon_rush_core::BoxFuture;
use coupon_rush_runtime::{HealthCheck, HealthProbe};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

/// `SELECT 1` against the durable store.
pub struct PostgresProbe {
    pool: PgPool,
}

impl PostgresProbe {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl HealthProbe for PostgresProbe {
    fn check(&self) -> BoxFuture<'_, HealthCheck> {
        Box::pin(async move {
            match sqlx::query("SELECT 1").execute(&self.pool).await {
                Ok(_) => HealthCheck::healthy("postgres"),
                Err(e) => HealthCheck::unhealthy("postgres", e.to_string()),
            }
        })
    }
}

/// `PING` against the fast-path backend.
///
/// Losing Redis degrades the service (allocation falls back to the row
/// lock) rather than taking it down.
pub struct RedisProbe {
    manager: ConnectionManager,
}

impl RedisProbe {
    pub const fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

impl HealthProbe for RedisProbe {
    fn check(&self) -> BoxFuture<'_, HealthCheck> {
        Box::pin(async move {
            match coupon_rush_redis::ping(&self.manager).await {
                Ok(()) => HealthCheck::healthy("redis"),
                Err(e) => HealthCheck::degraded("redis", e.to_string()),
            }
        })
    }
}
