//! Storage adapter trait for queue entries and rate-limit state.
//!
//! The queue core and the rate limiter hold no entry state of their own;
//! everything persistent goes through a [`QueueStorage`] implementation.

use async_trait::async_trait;

use crate::priority::Priority;

use super::error::StorageError;
use super::models::{EntryPatch, QueueEntry, QueueStats, QueueStatus, RateLimitPatch, RateLimitState};

/// Backend trait for queue storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// the queue core and the rate limiter.
///
/// # Concurrency
///
/// No claim or lease is taken between `fetch_by_status_and_priority` and
/// the dispatcher's `SENDING` update. Two dispatchers sharing one store can
/// fetch the same entry; an adapter shared across processes needs its own
/// claim step.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Persist a new entry and return its queue ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if the queue ID is already stored.
    async fn save(&self, entry: &QueueEntry) -> Result<String, StorageError>;

    /// Fetch up to `limit` entries in `status`, most urgent level first.
    ///
    /// Levels are visited in the order given. Within a level entries come
    /// out oldest first.
    async fn fetch_by_status_and_priority(
        &self,
        status: QueueStatus,
        limit: usize,
        priority_levels: &[Priority],
    ) -> Result<Vec<QueueEntry>, StorageError>;

    /// Apply a partial update to an existing entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown queue ID.
    async fn update_entry(&self, queue_id: &str, patch: EntryPatch) -> Result<(), StorageError>;

    /// Queue statistics, optionally restricted to one customer.
    async fn get_stats(&self, customer_id: Option<&str>) -> Result<QueueStats, StorageError>;

    /// Rate-limit state for a customer. Never-seen customers get the zero state.
    async fn get_rate_limit_state(&self, customer_id: &str) -> Result<RateLimitState, StorageError>;

    /// Apply a partial update to a customer's rate-limit state.
    async fn update_rate_limit_state(
        &self,
        customer_id: &str,
        patch: RateLimitPatch,
    ) -> Result<(), StorageError>;
}
