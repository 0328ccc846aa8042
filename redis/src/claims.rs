//! `Redis`-backed [`ClaimRegistry`].

use coupon_rush_core::BoxFuture;
use coupon_rush_core::claims::ClaimRegistry;
use coupon_rush_core::error::QueueError;
use coupon_rush_core::types::{CouponId, UserId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// One set per coupon, `coupon:issued:{id}`, holding the user ids that
/// claimed it. `SADD` answers "was it new" atomically.
#[derive(Clone)]
pub struct RedisClaimRegistry {
    conn_manager: ConnectionManager,
}

impl RedisClaimRegistry {
    /// Create a registry over a shared connection manager.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn issued_key(coupon_id: CouponId) -> String {
        format!("coupon:issued:{coupon_id}")
    }
}

impl ClaimRegistry for RedisClaimRegistry {
    fn claim(&self, user_id: UserId, coupon_id: CouponId) -> BoxFuture<'_, Result<bool, QueueError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let added: i64 = conn
                .sadd(Self::issued_key(coupon_id), user_id.get())
                .await
                .map_err(|e| QueueError::Unavailable(format!("Failed to record claim: {e}")))?;
            Ok(added == 1)
        })
    }

    fn release(&self, user_id: UserId, coupon_id: CouponId) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: i64 = conn
                .srem(Self::issued_key(coupon_id), user_id.get())
                .await
                .map_err(|e| QueueError::Unavailable(format!("Failed to release claim: {e}")))?;
            Ok(())
        })
    }
}
