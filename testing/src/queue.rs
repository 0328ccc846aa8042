//! In-memory [`IssuanceQueue`].

use crate::faults::FaultSwitch;
use coupon_rush_core::BoxFuture;
use coupon_rush_core::error::QueueError;
use coupon_rush_core::queue::{IssuanceQueue, IssuanceQueueEntry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Lists {
    main: VecDeque<IssuanceQueueEntry>,
    retry: VecDeque<IssuanceQueueEntry>,
}

/// Two FIFO lists behind one mutex.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssuanceQueue {
    lists: Arc<Mutex<Lists>>,
    faults: FaultSwitch,
}

fn poisoned() -> QueueError {
    QueueError::Unavailable("Mutex lock failed".to_string())
}

impl InMemoryIssuanceQueue {
    /// Both lists empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the main queue, oldest first.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn main_entries(&self) -> Vec<IssuanceQueueEntry> {
        self.lists.lock().unwrap().main.iter().cloned().collect()
    }

    /// Copy of the retry queue, oldest first.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn retry_entries(&self) -> Vec<IssuanceQueueEntry> {
        self.lists.lock().unwrap().retry.iter().cloned().collect()
    }

    /// Fault switches for both lists.
    #[must_use]
    pub const fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    async fn guard(&self) -> Result<(), QueueError> {
        self.faults.check().await.map_err(QueueError::Unavailable)
    }
}

impl IssuanceQueue for InMemoryIssuanceQueue {
    fn enqueue(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            self.lists.lock().map_err(|_| poisoned())?.main.push_back(entry);
            Ok(())
        })
    }

    fn poll(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            Ok(self.lists.lock().map_err(|_| poisoned())?.main.pop_front())
        })
    }

    fn enqueue_retry(&self, entry: IssuanceQueueEntry) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            self.lists.lock().map_err(|_| poisoned())?.retry.push_back(entry);
            Ok(())
        })
    }

    fn poll_retry(&self) -> BoxFuture<'_, Result<Option<IssuanceQueueEntry>, QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            Ok(self.lists.lock().map_err(|_| poisoned())?.retry.pop_front())
        })
    }

    fn queue_size(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            Ok(self.lists.lock().map_err(|_| poisoned())?.main.len() as u64)
        })
    }

    fn retry_size(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            Ok(self.lists.lock().map_err(|_| poisoned())?.retry.len() as u64)
        })
    }

    fn requeue_retry(&self, limit: u64) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            let mut lists = self.lists.lock().map_err(|_| poisoned())?;
            let mut moved = 0;
            while moved < limit {
                let Some(mut entry) = lists.retry.pop_front() else {
                    break;
                };
                entry.not_before = None;
                lists.main.push_back(entry);
                moved += 1;
            }
            Ok(moved)
        })
    }

    fn clear_retry(&self) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            self.guard().await?;
            self.lists.lock().map_err(|_| poisoned())?.retry.clear();
            Ok(())
        })
    }
}
