//! Operator view of the issuance queues.

use crate::metrics::IssuanceMetrics;
use coupon_rush_core::dead_letter::DeadLetterSink;
use coupon_rush_core::error::{QueueError, StoreError};
use coupon_rush_core::queue::IssuanceQueue;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Default number of entries moved by a manual requeue.
pub const DEFAULT_REQUEUE_LIMIT: u64 = 1000;

/// Admin operation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Queue backend failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Dead-letter store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Issuance settings echoed in the queue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Whether grants are persisted by the worker
    pub async_enabled: bool,
    /// Worker batch size
    pub batch_size: usize,
    /// Worker poll interval in milliseconds
    pub delay_ms: u64,
}

/// Queue status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Whether grants are persisted by the worker
    pub async_enabled: bool,
    /// Worker batch size
    pub batch_size: usize,
    /// Worker poll interval in milliseconds
    pub delay_ms: u64,
    /// Main-queue depth
    pub queue_size: u64,
    /// Retry-queue depth
    pub retry_size: u64,
    /// Pending dead-letter entries
    pub dead_letter_size: u64,
}

/// Queue depths after a retry-queue change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryQueueChange {
    /// Entries moved back to the main queue, absent for a clear
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved: Option<u64>,
    /// Main-queue depth
    pub queue_size: u64,
    /// Retry-queue depth
    pub retry_size: u64,
}

/// Queue inspection and retry-queue maintenance.
#[derive(Clone)]
pub struct IssuanceAdmin {
    queue: Arc<dyn IssuanceQueue>,
    dead_letters: Arc<dyn DeadLetterSink>,
    settings: QueueSettings,
}

impl IssuanceAdmin {
    /// Create an admin view.
    #[must_use]
    pub fn new(
        queue: Arc<dyn IssuanceQueue>,
        dead_letters: Arc<dyn DeadLetterSink>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            settings,
        }
    }

    /// Settings and current depths.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError`] if a depth could not be read.
    pub async fn status(&self) -> Result<QueueStatus, AdminError> {
        let (queue_size, retry_size) = self.depths().await?;
        let dead_letter_size = self.dead_letters.count_pending().await?;
        Ok(QueueStatus {
            async_enabled: self.settings.async_enabled,
            batch_size: self.settings.batch_size,
            delay_ms: self.settings.delay_ms,
            queue_size,
            retry_size,
            dead_letter_size,
        })
    }

    /// Move up to `limit` retry entries back onto the main queue.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Queue`] on backend failure.
    pub async fn requeue_retry(&self, limit: u64) -> Result<RetryQueueChange, AdminError> {
        let moved = self.queue.requeue_retry(limit).await?;
        IssuanceMetrics::record_requeued(moved);
        let (queue_size, retry_size) = self.depths().await?;
        info!(moved, queue_size, retry_size, "Retry entries requeued");
        Ok(RetryQueueChange {
            moved: Some(moved),
            queue_size,
            retry_size,
        })
    }

    /// Drop every retry entry.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Queue`] on backend failure.
    pub async fn clear_retry(&self) -> Result<RetryQueueChange, AdminError> {
        self.queue.clear_retry().await?;
        let (queue_size, retry_size) = self.depths().await?;
        info!(queue_size, "Retry queue cleared");
        Ok(RetryQueueChange {
            moved: None,
            queue_size,
            retry_size,
        })
    }

    async fn depths(&self) -> Result<(u64, u64), AdminError> {
        let queue_size = self.queue.queue_size().await?;
        let retry_size = self.queue.retry_size().await?;
        IssuanceMetrics::record_depths(queue_size, retry_size);
        Ok((queue_size, retry_size))
    }
}
