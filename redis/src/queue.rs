//! `Redis`-backed [`IssuanceQueue`].
//!
//! Both queues are lists used FIFO: producers `LPUSH`, the worker `RPOP`s.
//! Payloads are the JSON form of [`IssuanceQueueEntry`].

use coupon_rush_core::BoxFuture;
use coupon_rush_core::error::QueueError;
use coupon_rush_core::queue::{IssuanceQueue, IssuanceQueueEntry};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// Main issuance list.
pub const ISSUE_QUEUE_KEY: &str = "coupon:issue:queue";

/// Retry issuance list.
pub const RETRY_QUEUE_KEY: &str = "coupon:issue:retry";

/// Move the retry tail to the main head if it is still `ARGV[1]`, writing
/// `ARGV[2]` in its place.
const MOVE_TAIL_SCRIPT: &str = r"
if redis.call('LINDEX', KEYS[1], -1) == ARGV[1] then
    redis.call('RPOP', KEYS[1])
    redis.call('LPUSH', KEYS[2], ARGV[2])
    return 1
end
return 0
";

/// Issuance queues on `Redis` lists.
#[derive(Clone)]
pub struct RedisIssuanceQueue {
    conn_manager: ConnectionManager,
    move_tail: Script,
}

impl RedisIssuanceQueue {
    /// Create queues over a shared connection manager.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            move_tail: Script::new(MOVE_TAIL_SCRIPT),
        }
    }

    async fn push(&self, key: &str, entry: &IssuanceQueueEntry) -> Result<(), QueueError> {
        let payload = entry.to_json()?;
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .lpush(key, payload)
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to push to {key}: {e}")))?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<IssuanceQueueEntry>, QueueError> {
        let mut conn = self.conn_manager.clone();
        let payload: Option<String> = conn
            .rpop(key, None)
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to pop from {key}: {e}")))?;

        payload
            .map(|payload| {
                IssuanceQueueEntry::from_json(&payload).inspect_err(|e| {
                    tracing::error!(queue = key, payload = %payload, error = %e, "Dropped undecodable queue entry");
                })
            })
            .transpose()
    }

    async fn len(&self, key: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn_manager.clone();
        conn.llen(key)
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to read length of {key}: {e}")))
    }
}

impl IssuanceQueue for RedisIssuanceQueue {
    fn enqueue(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move { self.push(ISSUE_QUEUE_KEY, &entry).await })
    }

    fn poll(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>> {
        Box::pin(self.pop(ISSUE_QUEUE_KEY))
    }

    fn enqueue_retry(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move { self.push(RETRY_QUEUE_KEY, &entry).await })
    }

    fn poll_retry(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>> {
        Box::pin(self.pop(RETRY_QUEUE_KEY))
    }

    fn queue_size(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(self.len(ISSUE_QUEUE_KEY))
    }

    fn retry_size(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(self.len(RETRY_QUEUE_KEY))
    }

    fn requeue_retry(&self, limit: u64) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let mut moved = 0;

            while moved < limit {
                let tail: Option<String> = conn.lindex(RETRY_QUEUE_KEY, -1).await.map_err(|e| {
                    QueueError::Unavailable(format!("Failed to read retry queue: {e}"))
                })?;
                let Some(tail) = tail else {
                    break;
                };

                // undecodable payloads move unchanged
                let rewritten = match IssuanceQueueEntry::from_json(&tail) {
                    Ok(mut entry) => {
                        entry.not_before = None;
                        entry.to_json()?
                    }
                    Err(_) => tail.clone(),
                };

                let applied: i64 = self
                    .move_tail
                    .key(RETRY_QUEUE_KEY)
                    .key(ISSUE_QUEUE_KEY)
                    .arg(&tail)
                    .arg(&rewritten)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|e| QueueError::Unavailable(format!("Failed to requeue entry: {e}")))?;

                // 0 means the worker took the tail first; re-read
                if applied == 1 {
                    moved += 1;
                }
            }

            Ok(moved)
        })
    }

    fn clear_retry(&self) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: i64 = conn
                .del(RETRY_QUEUE_KEY)
                .await
                .map_err(|e| QueueError::Unavailable(format!("Failed to clear retry queue: {e}")))?;
            Ok(())
        })
    }
}
