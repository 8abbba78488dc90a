//! In-memory queue storage using DashMap.
//!
//! Entries and rate-limit state live in process memory and are lost on
//! restart. Suitable for tests and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::priority::Priority;

use super::backend::QueueStorage;
use super::error::StorageError;
use super::models::{
    EntryPatch, QueueEntry, QueueStats, QueueStatus, RateLimitPatch, RateLimitState,
};

/// In-memory queue storage.
///
/// Ordering inside a fetch is priority first, then `created_at` (FIFO).
#[derive(Default)]
pub struct MemoryQueueStorage {
    entries: DashMap<String, QueueEntry>,
    rate_limits: DashMap<String, RateLimitState>,
}

impl MemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a stored entry
    pub fn get(&self, queue_id: &str) -> Option<QueueEntry> {
        self.entries.get(queue_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl QueueStorage for MemoryQueueStorage {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, entry: &QueueEntry) -> Result<String, StorageError> {
        if entry.priority.is_none() {
            return Err(StorageError::Invalid(format!(
                "entry {} has no priority",
                entry.queue_id
            )));
        }

        match self.entries.entry(entry.queue_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::Duplicate(entry.queue_id.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                tracing::debug!(
                    queue_id = %entry.queue_id,
                    customer_id = %entry.customer_id,
                    stored = self.entries.len(),
                    "Entry saved to memory storage"
                );
                Ok(entry.queue_id.clone())
            }
        }
    }

    async fn fetch_by_status_and_priority(
        &self,
        status: QueueStatus,
        limit: usize,
        priority_levels: &[Priority],
    ) -> Result<Vec<QueueEntry>, StorageError> {
        let mut batch = Vec::new();
        if limit == 0 {
            return Ok(batch);
        }

        // Snapshot matching entries first to avoid holding shard locks
        let matching: Vec<QueueEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.clone())
            .collect();

        for level in priority_levels {
            let mut at_level: Vec<&QueueEntry> = matching
                .iter()
                .filter(|e| e.priority == Some(*level))
                .collect();
            at_level.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.queue_id.cmp(&b.queue_id))
            });

            for entry in at_level {
                if batch.len() >= limit {
                    return Ok(batch);
                }
                batch.push(entry.clone());
            }
        }

        Ok(batch)
    }

    async fn update_entry(&self, queue_id: &str, patch: EntryPatch) -> Result<(), StorageError> {
        let mut entry = self
            .entries
            .get_mut(queue_id)
            .ok_or_else(|| StorageError::NotFound(queue_id.to_string()))?;
        entry.apply_patch(&patch);
        Ok(())
    }

    async fn get_stats(&self, customer_id: Option<&str>) -> Result<QueueStats, StorageError> {
        let mut stats = QueueStats::default();
        let mut delay_total_ms: i64 = 0;

        for entry in self.entries.iter() {
            if customer_id.is_some_and(|c| c != entry.customer_id) {
                continue;
            }

            if entry.status.is_awaiting_dispatch() {
                if let Some(priority) = entry.priority {
                    stats.queue_depth.add(priority, 1);
                }
            }

            match entry.status {
                QueueStatus::Pending => stats.pending_count += 1,
                QueueStatus::Failed => stats.failed_count += 1,
                QueueStatus::Retry => stats.retry_count += 1,
                QueueStatus::Sent => {
                    stats.sent_count += 1;
                    if let Some(sent_at) = entry.sent_at {
                        delay_total_ms += (sent_at - entry.created_at).max(0);
                    }
                }
                QueueStatus::Sending => {}
            }
        }

        if stats.sent_count > 0 {
            stats.average_dispatch_delay_seconds =
                delay_total_ms as f64 / stats.sent_count as f64 / 1000.0;
        }

        Ok(stats)
    }

    async fn get_rate_limit_state(&self, customer_id: &str) -> Result<RateLimitState, StorageError> {
        Ok(self
            .rate_limits
            .get(customer_id)
            .map(|s| *s)
            .unwrap_or_default())
    }

    async fn update_rate_limit_state(
        &self,
        customer_id: &str,
        patch: RateLimitPatch,
    ) -> Result<(), StorageError> {
        self.rate_limits
            .entry(customer_id.to_string())
            .or_default()
            .apply_patch(&patch);
        Ok(())
    }
}
