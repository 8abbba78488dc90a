//! Redis-based queue storage.
//!
//! Key layout, all under a configurable prefix:
//!
//! - `{prefix}:entry:{queue_id}`: the entry as a JSON string
//! - `{prefix}:idx:{scope}:{STATUS}:{priority}`: sorted set of queue IDs
//!   scored by `created_at`
//! - `{prefix}:delay:{scope}`: hash with `total_ms` and `count` of sent entries
//! - `{prefix}:ratelimit:{customer_id}`: hash with `last_dispatch_at` and
//!   `batch_count`
//!
//! `scope` is `all` or `customer:{customer_id}`, so stats can be read for
//! one customer or globally without scanning.

use std::sync::Arc;

use async_trait::async_trait;

use crate::priority::Priority;
use crate::redis::pool::RedisPool;

use super::backend::QueueStorage;
use super::error::StorageError;
use super::models::{
    EntryPatch, QueueEntry, QueueStats, QueueStatus, RateLimitPatch, RateLimitState,
};

const GLOBAL_SCOPE: &str = "all";

/// Store the entry only if its key is free, then index it.
///
/// KEYS[1] is the entry key, the remaining keys are index sets.
/// ARGV is the entry JSON, its `created_at` score and its queue ID.
/// Returns 1 when stored and 0 when the ID is taken.
const SAVE_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
for i = 2, #KEYS do
    redis.call('ZADD', KEYS[i], ARGV[2], ARGV[3])
end
return 1
"#;

/// Statuses reported by `get_stats`
const COUNTED_STATUSES: [QueueStatus; 4] = [
    QueueStatus::Pending,
    QueueStatus::Retry,
    QueueStatus::Failed,
    QueueStatus::Sent,
];

/// Redis-based queue storage.
pub struct RedisQueueStorage {
    pool: Arc<RedisPool>,
    prefix: String,
}

impl RedisQueueStorage {
    pub fn new(pool: Arc<RedisPool>, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    fn entry_key(&self, queue_id: &str) -> String {
        format!("{}:entry:{}", self.prefix, queue_id)
    }

    fn index_key(&self, scope: &str, status: QueueStatus, priority: Priority) -> String {
        format!(
            "{}:idx:{}:{}:{}",
            self.prefix,
            scope,
            status.as_str(),
            priority.as_u8()
        )
    }

    fn delay_key(&self, scope: &str) -> String {
        format!("{}:delay:{}", self.prefix, scope)
    }

    fn rate_limit_key(&self, customer_id: &str) -> String {
        format!("{}:ratelimit:{}", self.prefix, customer_id)
    }

    fn customer_scope(customer_id: &str) -> String {
        format!("customer:{}", customer_id)
    }

    /// Scopes an entry is indexed under
    fn scopes(customer_id: &str) -> [String; 2] {
        [GLOBAL_SCOPE.to_string(), Self::customer_scope(customer_id)]
    }

    fn entry_priority(entry: &QueueEntry) -> Result<Priority, StorageError> {
        entry
            .priority
            .ok_or_else(|| StorageError::Invalid(format!("entry {} has no priority", entry.queue_id)))
    }

    async fn load_entry(&self, queue_id: &str) -> Result<Option<QueueEntry>, StorageError> {
        let key = self.entry_key(queue_id);
        let raw: Option<String> = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("GET").arg(&key).query_async(&mut conn).await
            })
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Entry key followed by every index key the entry is added to on save
    fn save_keys(&self, entry: &QueueEntry, priority: Priority) -> Vec<String> {
        let mut keys = vec![self.entry_key(&entry.queue_id)];
        keys.extend(
            Self::scopes(&entry.customer_id)
                .iter()
                .map(|scope| self.index_key(scope, entry.status, priority)),
        );
        keys
    }

    /// Up to `count` ids from a sorted-set index, oldest first
    async fn index_page(
        &self,
        index: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, StorageError> {
        let index = index.to_string();
        let start = offset as isize;
        let stop = (offset + count) as isize - 1;
        let ids: Vec<String> = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("ZRANGE")
                    .arg(&index)
                    .arg(start)
                    .arg(stop)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(ids)
    }

    /// Remove ids whose entry no longer exists
    async fn drop_index_members(&self, index: &str, ids: Vec<String>) -> Result<(), StorageError> {
        let index = index.to_string();
        let _: () = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("ZREM").arg(&index).arg(&ids).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn load_entries(&self, queue_ids: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        let keys: Vec<String> = queue_ids.iter().map(|id| self.entry_key(id)).collect();
        let raw: Vec<Option<String>> = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("MGET").arg(&keys).query_async(&mut conn).await
            })
            .await?;
        Ok(raw)
    }
}

#[async_trait]
impl QueueStorage for RedisQueueStorage {
    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn save(&self, entry: &QueueEntry) -> Result<String, StorageError> {
        let priority = Self::entry_priority(entry)?;
        let json = serde_json::to_string(entry)?;
        let keys = self.save_keys(entry, priority);
        let created_at = entry.created_at;
        let queue_id = entry.queue_id.clone();

        let stored: i64 = self
            .pool
            .execute(move |mut conn| async move {
                let script = redis::Script::new(SAVE_SCRIPT);
                let mut invocation = script.prepare_invoke();
                for key in &keys {
                    invocation.key(key);
                }
                invocation
                    .arg(&json)
                    .arg(created_at)
                    .arg(&queue_id)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        if stored == 0 {
            return Err(StorageError::Duplicate(entry.queue_id.clone()));
        }

        tracing::debug!(
            queue_id = %entry.queue_id,
            customer_id = %entry.customer_id,
            priority = priority.as_u8(),
            "Entry saved to Redis storage"
        );

        Ok(entry.queue_id.clone())
    }

    async fn fetch_by_status_and_priority(
        &self,
        status: QueueStatus,
        limit: usize,
        priority_levels: &[Priority],
    ) -> Result<Vec<QueueEntry>, StorageError> {
        let mut batch = Vec::new();

        for level in priority_levels {
            let index = self.index_key(GLOBAL_SCOPE, status, *level);
            let mut offset = 0usize;

            // Stale ids are skipped, so keep paging until the batch is full
            // or the index is exhausted
            while batch.len() < limit {
                let wanted = limit - batch.len();
                let ids = self.index_page(&index, offset, wanted).await?;
                if ids.is_empty() {
                    break;
                }
                offset += ids.len();

                let mut missing = Vec::new();
                for (id, raw) in ids.iter().zip(self.load_entries(&ids).await?) {
                    let Some(json) = raw else {
                        tracing::warn!(queue_id = %id, "Indexed entry missing from Redis storage");
                        missing.push(id.clone());
                        continue;
                    };
                    match serde_json::from_str::<QueueEntry>(&json) {
                        Ok(entry) if entry.status == status => batch.push(entry),
                        Ok(entry) => {
                            tracing::warn!(
                                queue_id = %id,
                                indexed = %status,
                                actual = %entry.status,
                                "Stale status index entry skipped"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                queue_id = %id,
                                "Failed to deserialize queue entry"
                            );
                        }
                    }
                }

                if !missing.is_empty() {
                    offset -= missing.len();
                    self.drop_index_members(&index, missing).await?;
                }

                if ids.len() < wanted {
                    break;
                }
            }

            if batch.len() >= limit {
                break;
            }
        }

        Ok(batch)
    }

    async fn update_entry(&self, queue_id: &str, patch: EntryPatch) -> Result<(), StorageError> {
        let mut entry = self
            .load_entry(queue_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(queue_id.to_string()))?;
        let priority = Self::entry_priority(&entry)?;
        let previous = entry.status;

        entry.apply_patch(&patch);
        let json = serde_json::to_string(&entry)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET")
            .arg(self.entry_key(queue_id))
            .arg(&json)
            .arg("XX")
            .ignore();

        if entry.status != previous {
            for scope in Self::scopes(&entry.customer_id) {
                pipe.cmd("ZREM")
                    .arg(self.index_key(&scope, previous, priority))
                    .arg(queue_id)
                    .ignore();
                pipe.cmd("ZADD")
                    .arg(self.index_key(&scope, entry.status, priority))
                    .arg(entry.created_at)
                    .arg(queue_id)
                    .ignore();

                if entry.status == QueueStatus::Sent {
                    if let Some(sent_at) = entry.sent_at {
                        let delay_key = self.delay_key(&scope);
                        pipe.cmd("HINCRBY")
                            .arg(&delay_key)
                            .arg("total_ms")
                            .arg((sent_at - entry.created_at).max(0))
                            .ignore();
                        pipe.cmd("HINCRBY").arg(&delay_key).arg("count").arg(1).ignore();
                    }
                }
            }
        }

        let _: () = self
            .pool
            .execute(move |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        Ok(())
    }

    async fn get_stats(&self, customer_id: Option<&str>) -> Result<QueueStats, StorageError> {
        let scope = customer_id
            .map(Self::customer_scope)
            .unwrap_or_else(|| GLOBAL_SCOPE.to_string());

        let mut pipe = redis::pipe();
        for status in COUNTED_STATUSES {
            for priority in Priority::ALL {
                pipe.cmd("ZCARD").arg(self.index_key(&scope, status, priority));
            }
        }
        let counts: Vec<u64> = self
            .pool
            .execute(move |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        let delay_key = self.delay_key(&scope);
        let (total_ms, sent_with_delay): (Option<i64>, Option<i64>) = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("HMGET")
                    .arg(&delay_key)
                    .arg("total_ms")
                    .arg("count")
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        let mut stats = QueueStats::default();
        let per_status = Priority::ALL.len();
        for (i, status) in COUNTED_STATUSES.into_iter().enumerate() {
            let row = counts.get(i * per_status..(i + 1) * per_status).unwrap_or(&[]);
            let total: u64 = row.iter().sum();

            if status.is_awaiting_dispatch() {
                for (priority, count) in Priority::ALL.into_iter().zip(row) {
                    stats.queue_depth.add(priority, *count);
                }
            }

            match status {
                QueueStatus::Pending => stats.pending_count = total,
                QueueStatus::Retry => stats.retry_count = total,
                QueueStatus::Failed => stats.failed_count = total,
                QueueStatus::Sent => stats.sent_count = total,
                QueueStatus::Sending => {}
            }
        }

        if let (Some(total_ms), Some(count)) = (total_ms, sent_with_delay) {
            if count > 0 {
                stats.average_dispatch_delay_seconds = total_ms as f64 / count as f64 / 1000.0;
            }
        }

        Ok(stats)
    }

    async fn get_rate_limit_state(&self, customer_id: &str) -> Result<RateLimitState, StorageError> {
        let key = self.rate_limit_key(customer_id);
        let (last_dispatch_at, batch_count): (Option<i64>, Option<u64>) = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("HMGET")
                    .arg(&key)
                    .arg("last_dispatch_at")
                    .arg("batch_count")
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(RateLimitState {
            last_dispatch_at: last_dispatch_at.unwrap_or(0),
            batch_count: batch_count.unwrap_or(0),
        })
    }

    async fn update_rate_limit_state(
        &self,
        customer_id: &str,
        patch: RateLimitPatch,
    ) -> Result<(), StorageError> {
        if patch.last_dispatch_at.is_none() && patch.batch_count.is_none() {
            return Ok(());
        }

        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.rate_limit_key(customer_id));
        if let Some(ts) = patch.last_dispatch_at {
            cmd.arg("last_dispatch_at").arg(ts);
        }
        if let Some(count) = patch.batch_count {
            cmd.arg("batch_count").arg(count);
        }

        let _: () = self
            .pool
            .execute(move |mut conn| async move { cmd.query_async(&mut conn).await })
            .await?;

        Ok(())
    }
}
