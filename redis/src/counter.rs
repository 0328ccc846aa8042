//! `Redis`-backed [`SlotCounter`].

use coupon_rush_core::BoxFuture;
use coupon_rush_core::counter::SlotCounter;
use coupon_rush_core::error::CounterError;
use coupon_rush_core::types::CouponId;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, RedisError, Script};

/// `DECR` only an existing key; nil for a missing one.
const DECR_EXISTING_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('DECR', KEYS[1])
end
return false
";

/// Fast-path counter stored as `coupon:stock:{id}`.
///
/// A plain `DECR` would create a missing key at `-1` and deny every request
/// until the next resync, so decrements run through a script that leaves
/// missing keys alone and reports them as [`CounterError::Unseeded`].
#[derive(Clone)]
pub struct RedisSlotCounter {
    conn_manager: ConnectionManager,
    decr_existing: Script,
}

impl RedisSlotCounter {
    /// Create a counter over a shared connection manager.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            decr_existing: Script::new(DECR_EXISTING_SCRIPT),
        }
    }

    /// Get the `Redis` key for a coupon's counter.
    fn stock_key(coupon_id: CouponId) -> String {
        format!("coupon:stock:{coupon_id}")
    }
}

fn counter_error(e: &RedisError) -> CounterError {
    // DECR inside a script reports a non-integer value as a script error
    if e.kind() == ErrorKind::TypeError || e.to_string().contains("not an integer") {
        CounterError::Corrupt(e.to_string())
    } else {
        CounterError::Unavailable(e.to_string())
    }
}

impl SlotCounter for RedisSlotCounter {
    fn decrement(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let remaining: Option<i64> = self
                .decr_existing
                .key(Self::stock_key(coupon_id))
                .invoke_async(&mut conn)
                .await
                .map_err(|e| counter_error(&e))?;
            remaining.ok_or(CounterError::Unseeded(coupon_id))
        })
    }

    fn increment(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: i64 = conn
                .incr(Self::stock_key(coupon_id), 1)
                .await
                .map_err(|e| counter_error(&e))?;
            Ok(value)
        })
    }

    fn set(&self, coupon_id: CouponId, value: i64) -> BoxFuture<'_, Result<(), CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set(Self::stock_key(coupon_id), value)
                .await
                .map_err(|e| counter_error(&e))?;
            tracing::debug!(coupon_id = %coupon_id, value, "Counter set");
            Ok(())
        })
    }

    fn get(&self, coupon_id: CouponId) -> BoxFuture<'_, Result<Option<i64>, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<i64> = conn
                .get(Self::stock_key(coupon_id))
                .await
                .map_err(|e| counter_error(&e))?;
            Ok(value)
        })
    }
}
