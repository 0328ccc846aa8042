//! Dead Letter Queue (DLQ) for issuance entries.
//!
//! Entries land here once the worker has spent their retry budget. They stay
//! `pending` until an operator resolves or discards them, so a grant is never
//! lost without a trace.

use chrono::{DateTime, Utc};
use coupon_rush_core::BoxFuture;
use coupon_rush_core::dead_letter::{DeadLetterSink, FailedIssuance};
use coupon_rush_core::error::StoreError;
use coupon_rush_core::queue::IssuanceQueueEntry;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

/// Status of a failed issuance in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Awaiting investigation
    Pending,
    /// Issued by an operator after the fact
    Resolved,
    /// Permanently abandoned
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Serialization(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// `PostgreSQL`-based Dead Letter Queue backed by `failed_issuances`.
///
/// # Example
///
/// ```no_run
/// use coupon_rush_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list_by_status(coupon_rush_postgres::DLQStatus::Pending, 100).await?;
/// for failed in &pending {
///     dlq.mark_resolved(failed.id, "ops", Some("issued manually")).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a failed entry. Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn insert(
        &self,
        entry: &IssuanceQueueEntry,
        error_message: &str,
    ) -> Result<i64, StoreError> {
        let attempts = i32::try_from(entry.attempt_count).unwrap_or(i32::MAX);
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_issuances (
                coupon_id, user_id, payload, attempt_count, error_message
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(entry.coupon_id.get())
        .bind(entry.user_id.get())
        .bind(Json(entry))
        .bind(attempts)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to dead-letter issuance: {e}")))?;

        tracing::warn!(
            dlq_id = id,
            coupon_id = %entry.coupon_id,
            user_id = %entry.user_id,
            attempts = entry.attempt_count,
            error = error_message,
            "Issuance added to Dead Letter Queue"
        );

        metrics::counter!("coupon_dlq_added_total").increment(1);

        Ok(id)
    }

    /// List failed issuances by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a payload is unreadable.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: u32,
    ) -> Result<Vec<FailedIssuance>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, payload, error_message, failed_at, status
            FROM failed_issuances
            WHERE status = $1
            ORDER BY failed_at ASC, id ASC
            LIMIT $2
            ",
        )
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to list dead letters: {e}")))?;

        rows.iter().map(Self::row_to_failed_issuance).collect()
    }

    /// Count entries with `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_by_status(&self, status: DLQStatus) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_issuances WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to count dead letters: {e}")))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Mark an entry as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or
    /// [`StoreError::Database`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.close(id, DLQStatus::Resolved, Some(resolved_by), notes).await?;
        tracing::info!(dlq_id = id, resolved_by, "DLQ entry marked as resolved");
        metrics::counter!("coupon_dlq_resolved_total").increment(1);
        Ok(())
    }

    /// Mark an entry as permanently abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or
    /// [`StoreError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.close(id, DLQStatus::Discarded, None, Some(reason)).await?;
        tracing::warn!(dlq_id = id, reason, "DLQ entry marked as discarded");
        metrics::counter!("coupon_dlq_discarded_total").increment(1);
        Ok(())
    }

    async fn close(
        &self,
        id: i64,
        status: DLQStatus,
        resolved_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE failed_issuances
            SET status = $1, resolved_at = NOW(), resolved_by = $2, resolution_notes = $3
            WHERE id = $4
            ",
        )
        .bind(status.as_str())
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to update dead letter: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("dead letter {id}")));
        }
        Ok(())
    }

    fn row_to_failed_issuance(row: &sqlx::postgres::PgRow) -> Result<FailedIssuance, StoreError> {
        let read = |e: sqlx::Error| StoreError::Serialization(format!("Bad dead-letter row: {e}"));

        let status: String = row.try_get("status").map_err(read)?;
        DLQStatus::parse(&status)?;
        let Json(entry): Json<IssuanceQueueEntry> = row.try_get("payload").map_err(read)?;
        let failed_at: DateTime<Utc> = row.try_get("failed_at").map_err(read)?;

        Ok(FailedIssuance {
            id: row.try_get("id").map_err(read)?,
            entry,
            error_message: row.try_get("error_message").map_err(read)?,
            failed_at,
        })
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn add_entry(
        &self,
        entry: IssuanceQueueEntry,
        error_message: String,
    ) -> BoxFuture<'_, Result<i64, StoreError>> {
        Box::pin(async move { self.insert(&entry, &error_message).await })
    }

    fn count_pending(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(self.count_by_status(DLQStatus::Pending))
    }

    fn list_pending(&self, limit: u32) -> BoxFuture<'_, Result<Vec<FailedIssuance>, StoreError>> {
        Box::pin(self.list_by_status(DLQStatus::Pending, limit))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in &[DLQStatus::Pending, DLQStatus::Resolved, DLQStatus::Discarded] {
            let s = status.as_str();
            let parsed = DLQStatus::parse(s).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(matches!(
            DLQStatus::parse("processing"),
            Err(StoreError::Serialization(_))
        ));
    }
}
