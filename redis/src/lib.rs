//! `Redis` adapters for Coupon Rush.
//!
//! - [`RedisSlotCounter`]: the fast-path counter, one integer key per coupon
//!   (`coupon:stock:{id}`), decremented with `DECR`
//! - [`RedisIssuanceQueue`]: the main and retry issuance lists
//!   (`coupon:issue:queue`, `coupon:issue:retry`) holding JSON entries
//! - [`RedisClaimRegistry`]: per-coupon sets of users that already claimed
//!   (`coupon:issued:{id}`)
//!
//! All adapters share one [`ConnectionManager`], which reconnects on its own
//! after a dropped connection.
//!
//! # Example
//!
//! ```no_run
//! use coupon_rush_redis::{RedisSlotCounter, connect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = connect("redis://127.0.0.1:6379").await?;
//! let counter = RedisSlotCounter::new(manager.clone());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};

pub mod claims;
pub mod counter;
pub mod queue;

pub use claims::RedisClaimRegistry;
pub use counter::RedisSlotCounter;
pub use queue::RedisIssuanceQueue;

/// Open a connection manager for `redis_url`.
///
/// # Errors
///
/// Returns [`RedisError`] if the URL is invalid or the first connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;
    tracing::info!("Connected to Redis");
    Ok(manager)
}

/// Round-trip a `PING`.
///
/// # Errors
///
/// Returns [`RedisError`] if the server did not answer.
pub async fn ping(manager: &ConnectionManager) -> Result<(), RedisError> {
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
