//! Queue core: enqueue, priority-ordered dequeue and status transitions.

use std::sync::Arc;

use crate::metrics::QueueMetrics;
use crate::priority::Priority;

use super::backend::QueueStorage;
use super::error::QueueError;
use super::models::{current_time_ms, EntryPatch, QueueEntry, QueueStats, QueueStatus, StatusResult};

/// Whether another delivery attempt is allowed for this entry
pub fn should_retry(entry: &QueueEntry) -> bool {
    entry.should_retry()
}

/// Priority queue of Telegram notifications over a pluggable storage adapter.
///
/// Holds no entry state itself. Cloning shares the same storage.
#[derive(Clone)]
pub struct TelegramQueue {
    storage: Arc<dyn QueueStorage>,
}

/// Builder for [`TelegramQueue`]
#[derive(Default)]
pub struct TelegramQueueBuilder {
    storage: Option<Arc<dyn QueueStorage>>,
}

impl TelegramQueueBuilder {
    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Build the queue.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MissingStorage` when no storage adapter was set.
    pub fn build(self) -> Result<TelegramQueue, QueueError> {
        let storage = self.storage.ok_or(QueueError::MissingStorage)?;
        Ok(TelegramQueue { storage })
    }
}

impl TelegramQueue {
    pub fn builder() -> TelegramQueueBuilder {
        TelegramQueueBuilder::default()
    }

    pub fn new(storage: Arc<dyn QueueStorage>) -> Self {
        Self { storage }
    }

    /// The underlying storage adapter
    pub fn storage(&self) -> &Arc<dyn QueueStorage> {
        &self.storage
    }

    /// Store a prioritized entry and return its queue ID.
    pub async fn enqueue(&self, entry: &QueueEntry) -> Result<String, QueueError> {
        let priority = entry.priority.ok_or(QueueError::PriorityNotSet)?;

        let queue_id = self.storage.save(entry).await?;
        QueueMetrics::record_enqueued();

        tracing::debug!(
            queue_id = %queue_id,
            customer_id = %entry.customer_id,
            priority = priority.as_u8(),
            "Entry enqueued"
        );

        Ok(queue_id)
    }

    /// Take up to `batch_size` entries for dispatch.
    ///
    /// `PENDING` entries come first, most urgent level first. Remaining
    /// capacity is filled with `RETRY` entries in the same order. Entries
    /// are not marked; the dispatcher moves them to `SENDING` itself.
    pub async fn dequeue(&self, batch_size: usize) -> Result<Vec<QueueEntry>, QueueError> {
        if batch_size == 0 {
            return Err(QueueError::InvalidBatchSize);
        }

        let mut batch = self
            .storage
            .fetch_by_status_and_priority(QueueStatus::Pending, batch_size, &Priority::ALL)
            .await?;
        batch.truncate(batch_size);
        let pending = batch.len();

        if pending < batch_size {
            let retries = self
                .storage
                .fetch_by_status_and_priority(QueueStatus::Retry, batch_size - pending, &Priority::ALL)
                .await?;
            batch.extend(retries.into_iter().take(batch_size - pending));
        }

        QueueMetrics::record_dequeued(pending, batch.len() - pending);
        tracing::debug!(
            requested = batch_size,
            pending = pending,
            retry = batch.len() - pending,
            "Dequeued batch"
        );

        Ok(batch)
    }

    /// Record a status transition for an entry.
    ///
    /// `status` is parsed before storage is touched. The fields written
    /// depend on the status:
    ///
    /// | Status | Extra fields |
    /// |--------|--------------|
    /// | `SENT` | `last_attempt_at`, `sent_at`, `http_status` |
    /// | `FAILED` | `last_attempt_at`, `http_status`, `error_message` |
    /// | `RETRY` | `retry_count` |
    pub async fn update_status(
        &self,
        queue_id: &str,
        status: impl AsRef<str>,
        result: StatusResult,
    ) -> Result<(), QueueError> {
        let status: QueueStatus = status.as_ref().parse()?;
        let now = current_time_ms();

        let mut patch = EntryPatch {
            status: Some(status),
            ..Default::default()
        };

        match status {
            QueueStatus::Sent => {
                patch.last_attempt_at = Some(now);
                patch.sent_at = Some(now);
                patch.http_status = result.http_status;
            }
            QueueStatus::Failed => {
                patch.last_attempt_at = Some(now);
                patch.http_status = result.http_status;
                patch.error_message = result.error_message;
            }
            QueueStatus::Retry => {
                patch.retry_count = result.retry_count;
            }
            QueueStatus::Pending | QueueStatus::Sending => {}
        }

        self.storage.update_entry(queue_id, patch).await?;
        QueueMetrics::record_status_update(status.as_str());

        tracing::debug!(queue_id = %queue_id, status = %status, "Entry status updated");
        Ok(())
    }

    /// Queue statistics, optionally for one customer
    pub async fn queue_stats(&self, customer_id: Option<&str>) -> Result<QueueStats, QueueError> {
        Ok(self.storage.get_stats(customer_id).await?)
    }
}
