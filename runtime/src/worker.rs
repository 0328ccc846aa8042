//! Issuance worker: drains granted slots into durable issuance records.
//!
//! Each tick takes up to `batch_size` entries: the main queue first, the
//! retry queue only once the main queue is empty. A retry entry whose
//! `not_before` lies in the future is pushed back and retry draining stops
//! for that tick.
//!
//! A failed entry is re-queued with an incremented attempt count and a
//! backoff deadline. Once it has failed `max_attempts` times it is moved to
//! the dead-letter table.
//!
//! Polling pops an entry before it is persisted, so delivery from the queue
//! is at most once: a crash between the pop and the issuance write loses that
//! entry. A queue payload that cannot be decoded is logged and dropped by the
//! queue, and the tick stops there.

use crate::Providers;
use crate::metrics::IssuanceMetrics;
use crate::retry::RetryPolicy;
use coupon_rush_core::issuance::{InsertOutcome, IssuanceRecord};
use coupon_rush_core::queue::IssuanceQueueEntry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Worker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Entries processed per tick
    pub batch_size: usize,
    /// Pause between ticks
    pub poll_interval: Duration,
    /// Backoff and attempt budget for failed entries
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            poll_interval: Duration::from_millis(200),
            retry: RetryPolicy::default(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records written
    pub persisted: u64,
    /// Entries whose record already existed
    pub duplicates: u64,
    /// Entries routed to the retry queue
    pub retried: u64,
    /// Entries moved to the dead-letter table
    pub dead_lettered: u64,
    /// Retry entries pushed back because their deadline had not passed
    pub deferred: u64,
}

impl DrainReport {
    /// Entries taken off a queue this tick.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.persisted + self.duplicates + self.retried + self.dead_lettered
    }
}

/// Background consumer of the issuance queues.
pub struct IssuanceWorker {
    providers: Providers,
    config: WorkerConfig,
    running: Mutex<()>,
}

impl IssuanceWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(providers: Providers, config: WorkerConfig) -> Self {
        Self {
            providers,
            config,
            running: Mutex::new(()),
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one batch.
    ///
    /// Concurrent calls on the same worker are serialized.
    pub async fn drain_once(&self) -> DrainReport {
        let _guard = self.running.lock().await;
        let mut report = DrainReport::default();
        let now = self.providers.clock.now();

        for _ in 0..self.config.batch_size {
            let entry = match self.providers.queue.poll().await {
                Ok(Some(entry)) => entry,
                Ok(None) => match self.next_due_retry(now, &mut report).await {
                    Some(entry) => entry,
                    None => break,
                },
                Err(e) => {
                    warn!(error = %e, "Failed to poll issuance queue");
                    break;
                }
            };
            self.process(entry, &mut report).await;
        }

        self.publish_depths().await;
        if report.processed() > 0 {
            debug!(?report, "Issuance batch drained");
        }
        report
    }

    /// Next retry entry that may run at `now`, if any.
    async fn next_due_retry(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        report: &mut DrainReport,
    ) -> Option<IssuanceQueueEntry> {
        let entry = match self.providers.queue.poll_retry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to poll retry queue");
                return None;
            }
        };

        if entry.is_due(now) {
            return Some(entry);
        }

        match self.providers.queue.enqueue_retry(entry.clone()).await {
            Ok(()) => {
                report.deferred += 1;
                None
            }
            Err(e) => {
                // the entry is only held in memory now; attempt it early
                warn!(error = %e, "Failed to defer retry entry, processing it now");
                Some(entry)
            }
        }
    }

    async fn process(&self, entry: IssuanceQueueEntry, report: &mut DrainReport) {
        let record = IssuanceRecord::from(&entry);
        match self.providers.issuances.insert_if_absent(record).await {
            Ok(InsertOutcome::Inserted) => {
                report.persisted += 1;
                IssuanceMetrics::record_persisted();
                debug!(
                    user_id = %entry.user_id,
                    coupon_id = %entry.coupon_id,
                    attempts = entry.attempt_count,
                    "Issuance persisted"
                );
            }
            Ok(InsertOutcome::AlreadyIssued) => {
                report.duplicates += 1;
                IssuanceMetrics::record_duplicate();
            }
            Err(e) => self.route_failure(entry, e.to_string(), report).await,
        }
    }

    async fn route_failure(
        &self,
        mut entry: IssuanceQueueEntry,
        message: String,
        report: &mut DrainReport,
    ) {
        let retry = entry.attempt_count.saturating_add(1);
        let delay = chrono::Duration::from_std(self.config.retry.jittered_delay(retry))
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        entry.record_failure(message.clone(), self.providers.clock.now() + delay);

        if self.config.retry.is_exhausted(entry.attempt_count) {
            match self
                .providers
                .dead_letters
                .add_entry(entry.clone(), message.clone())
                .await
            {
                Ok(id) => {
                    report.dead_lettered += 1;
                    IssuanceMetrics::record_dead_lettered();
                    error!(
                        dead_letter_id = id,
                        user_id = %entry.user_id,
                        coupon_id = %entry.coupon_id,
                        attempts = entry.attempt_count,
                        error = %message,
                        "Issuance dead-lettered after max attempts"
                    );
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Failed to dead-letter issuance, keeping it in retry queue");
                }
            }
        }

        match self.providers.queue.enqueue_retry(entry.clone()).await {
            Ok(()) => {
                report.retried += 1;
                IssuanceMetrics::record_retried();
                warn!(
                    user_id = %entry.user_id,
                    coupon_id = %entry.coupon_id,
                    attempts = entry.attempt_count,
                    error = %message,
                    "Issuance failed, routed to retry queue"
                );
            }
            Err(e) => self.last_resort(entry, &e.to_string(), report).await,
        }
    }

    /// Retry queue refused the entry: try the dead-letter table regardless of
    /// the attempt budget, and failing that log the full payload.
    async fn last_resort(&self, entry: IssuanceQueueEntry, cause: &str, report: &mut DrainReport) {
        let payload = entry.to_json().unwrap_or_else(|_| format!("{entry:?}"));
        match self
            .providers
            .dead_letters
            .add_entry(entry, format!("retry queue unavailable: {cause}"))
            .await
        {
            Ok(_) => {
                report.dead_lettered += 1;
                IssuanceMetrics::record_dead_lettered();
            }
            Err(e) => {
                error!(
                    payload = %payload,
                    queue_error = %cause,
                    store_error = %e,
                    "Issuance entry could not be stored anywhere"
                );
            }
        }
    }

    async fn publish_depths(&self) {
        let queue = self.providers.queue.queue_size().await;
        let retry = self.providers.queue.retry_size().await;
        if let (Ok(queue), Ok(retry)) = (queue, retry) {
            IssuanceMetrics::record_depths(queue, retry);
        }
    }

    /// Run [`drain_once`](Self::drain_once) every `poll_interval` until a
    /// shutdown signal arrives. The batch in progress completes first.
    #[must_use]
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                batch_size = self.config.batch_size,
                poll_ms = self.config.poll_interval.as_millis(),
                "Issuance worker started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Issuance worker received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.drain_once().await;
                    }
                }
            }
        })
    }
}
