//! Terminal storage for issuance entries that exhausted their retries.

use crate::BoxFuture;
use crate::error::StoreError;
use crate::queue::IssuanceQueueEntry;
use chrono::{DateTime, Utc};

/// A dead-lettered issuance awaiting operator action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedIssuance {
    /// Row id.
    pub id: i64,
    /// The entry as it was when retries ran out.
    pub entry: IssuanceQueueEntry,
    /// Last failure message.
    pub error_message: String,
    /// When the entry was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

/// Durable sink for entries that exceeded the retry budget.
pub trait DeadLetterSink: Send + Sync {
    /// Store `entry` with status `pending`. Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the entry could not be stored; callers must
    /// keep the entry in the retry queue in that case.
    fn add_entry(
        &self,
        entry: IssuanceQueueEntry,
        error_message: String,
    ) -> BoxFuture<'_, Result<i64, StoreError>>;

    /// Number of entries still `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn count_pending(&self) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Oldest `limit` pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    fn list_pending(&self, limit: u32) -> BoxFuture<'_, Result<Vec<FailedIssuance>, StoreError>>;
}
