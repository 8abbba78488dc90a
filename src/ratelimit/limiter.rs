//! Per-customer batch pacing backed by queue storage.

use std::sync::Arc;

use serde::Serialize;

use crate::metrics::RateLimitMetrics;
use crate::priority::RateControl;
use crate::queue::{
    current_time_ms, QueueEntry, QueueStorage, RateLimitPatch, RateLimitState, StorageError,
};

use super::backoff::calculate_retry_delay;

/// Composite view of a customer's pacing state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub last_dispatch_at: i64,
    pub batch_count: u64,
    /// Whole seconds since the last batch, `None` when never dispatched
    pub time_since_last_dispatch_seconds: Option<u64>,
    pub can_send_now: bool,
    /// Seconds until the next batch is allowed, rounded up
    pub wait_time_seconds: u64,
}

fn wait_time(state: &RateLimitState, rate_control: &RateControl, now_ms: i64) -> u64 {
    if state.last_dispatch_at == 0 {
        return 0;
    }
    let elapsed = now_ms.saturating_sub(state.last_dispatch_at).max(0) as u64;
    rate_control.delay_between_batches_ms().saturating_sub(elapsed)
}

fn retry_delay(entry: &QueueEntry, rate_control: &RateControl) -> u64 {
    calculate_retry_delay(
        i64::from(entry.retry_count),
        rate_control.retry_backoff,
        i64::try_from(rate_control.retry_base_delay_seconds).unwrap_or(i64::MAX),
    )
}

/// Whether a retry of `entry` is due at `now_ms`
pub fn should_retry_now_at(entry: &QueueEntry, rate_control: &RateControl, now_ms: i64) -> bool {
    match entry.last_attempt_at {
        None => true,
        Some(last) => {
            let elapsed = now_ms.saturating_sub(last).max(0) as u64;
            elapsed >= retry_delay(entry, rate_control)
        }
    }
}

/// Whether a retry of `entry` is due now
pub fn should_retry_now(entry: &QueueEntry, rate_control: &RateControl) -> bool {
    should_retry_now_at(entry, rate_control, current_time_ms())
}

/// Epoch millis at which `entry` may be retried; `now_ms` if never attempted
pub fn get_next_retry_time_at(entry: &QueueEntry, rate_control: &RateControl, now_ms: i64) -> i64 {
    match entry.last_attempt_at {
        None => now_ms,
        Some(last) => {
            let delay = i64::try_from(retry_delay(entry, rate_control)).unwrap_or(i64::MAX);
            last.saturating_add(delay)
        }
    }
}

pub fn get_next_retry_time(entry: &QueueEntry, rate_control: &RateControl) -> i64 {
    get_next_retry_time_at(entry, rate_control, current_time_ms())
}

/// Batch rate limiter.
///
/// Pacing is advisory: storage faults while reading state allow the batch
/// and faults while recording are logged and dropped, so an unavailable
/// backend never stalls delivery.
pub struct BatchRateLimiter {
    storage: Arc<dyn QueueStorage>,
}

impl BatchRateLimiter {
    pub fn new(storage: Arc<dyn QueueStorage>) -> Self {
        Self { storage }
    }

    async fn load_state(&self, customer_id: &str, operation: &str) -> Option<RateLimitState> {
        match self.storage.get_rate_limit_state(customer_id).await {
            Ok(state) => Some(state),
            Err(e) => {
                RateLimitMetrics::record_storage_error(operation);
                tracing::warn!(
                    error = %e,
                    customer_id = %customer_id,
                    operation = operation,
                    "Rate limit state unavailable, failing open"
                );
                None
            }
        }
    }

    pub async fn can_send_batch_at(
        &self,
        customer_id: &str,
        rate_control: &RateControl,
        now_ms: i64,
    ) -> bool {
        match self.load_state(customer_id, "can_send_batch").await {
            Some(state) => wait_time(&state, rate_control, now_ms) == 0,
            None => true,
        }
    }

    /// Whether the customer's next batch may go out now
    pub async fn can_send_batch(&self, customer_id: &str, rate_control: &RateControl) -> bool {
        self.can_send_batch_at(customer_id, rate_control, current_time_ms())
            .await
    }

    pub async fn get_wait_time_at(
        &self,
        customer_id: &str,
        rate_control: &RateControl,
        now_ms: i64,
    ) -> u64 {
        match self.load_state(customer_id, "get_wait_time").await {
            Some(state) => wait_time(&state, rate_control, now_ms),
            None => 0,
        }
    }

    /// Milliseconds until the customer's next batch is allowed
    pub async fn get_wait_time(&self, customer_id: &str, rate_control: &RateControl) -> u64 {
        self.get_wait_time_at(customer_id, rate_control, current_time_ms())
            .await
    }

    pub async fn record_batch_dispatch_at(&self, customer_id: &str, batch_size: usize, now_ms: i64) {
        // An unreadable counter is left alone rather than reset
        let batch_count = self
            .load_state(customer_id, "record_batch_dispatch")
            .await
            .map(|state| state.batch_count.saturating_add(1));

        let patch = RateLimitPatch {
            last_dispatch_at: Some(now_ms),
            batch_count,
        };

        match self.storage.update_rate_limit_state(customer_id, patch).await {
            Ok(()) => {
                RateLimitMetrics::record_dispatch();
                tracing::debug!(
                    customer_id = %customer_id,
                    batch_size = batch_size,
                    "Batch dispatch recorded"
                );
            }
            Err(e) => {
                RateLimitMetrics::record_storage_error("record_batch_dispatch");
                tracing::warn!(
                    error = %e,
                    customer_id = %customer_id,
                    batch_size = batch_size,
                    "Failed to record batch dispatch"
                );
            }
        }
    }

    /// Record that a batch went out. Never fails.
    pub async fn record_batch_dispatch(&self, customer_id: &str, batch_size: usize) {
        self.record_batch_dispatch_at(customer_id, batch_size, current_time_ms())
            .await
    }

    pub async fn get_rate_limit_stats_at(
        &self,
        customer_id: &str,
        rate_control: &RateControl,
        now_ms: i64,
    ) -> Result<RateLimitStats, StorageError> {
        let state = self.storage.get_rate_limit_state(customer_id).await?;
        let wait_ms = wait_time(&state, rate_control, now_ms);

        Ok(RateLimitStats {
            last_dispatch_at: state.last_dispatch_at,
            batch_count: state.batch_count,
            time_since_last_dispatch_seconds: (state.last_dispatch_at != 0)
                .then(|| (now_ms.saturating_sub(state.last_dispatch_at).max(0) / 1000) as u64),
            can_send_now: wait_ms == 0,
            wait_time_seconds: wait_ms.div_ceil(1000),
        })
    }

    pub async fn get_rate_limit_stats(
        &self,
        customer_id: &str,
        rate_control: &RateControl,
    ) -> Result<RateLimitStats, StorageError> {
        self.get_rate_limit_stats_at(customer_id, rate_control, current_time_ms())
            .await
    }

    /// Forget a customer's dispatch history
    pub async fn reset_rate_limit_state(&self, customer_id: &str) -> Result<(), StorageError> {
        self.storage
            .update_rate_limit_state(
                customer_id,
                RateLimitPatch {
                    last_dispatch_at: Some(0),
                    batch_count: Some(0),
                },
            )
            .await?;

        tracing::info!(customer_id = %customer_id, "Rate limit state reset");
        Ok(())
    }

    /// Gate for the dispatch loop before attempting a batch
    pub async fn apply_rate_limit(&self, customer_id: &str, rate_control: &RateControl) -> bool {
        self.apply_rate_limit_at(customer_id, rate_control, current_time_ms())
            .await
    }

    pub async fn apply_rate_limit_at(
        &self,
        customer_id: &str,
        rate_control: &RateControl,
        now_ms: i64,
    ) -> bool {
        let allowed = self.can_send_batch_at(customer_id, rate_control, now_ms).await;
        if !allowed {
            RateLimitMetrics::record_denied();
            tracing::debug!(customer_id = %customer_id, "Batch held back by rate limit");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::priority::{Priority, RetryBackoff};
    use crate::queue::{
        EntryPatch, MemoryQueueStorage, NotificationPayload, QueueStats, QueueStatus,
    };

    const NOW: i64 = 1_700_000_000_000;

    /// Storage whose every call fails
    struct UnavailableStorage;

    #[async_trait]
    impl QueueStorage for UnavailableStorage {
        fn backend_type(&self) -> &'static str {
            "unavailable"
        }

        async fn save(&self, _entry: &QueueEntry) -> Result<String, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }

        async fn fetch_by_status_and_priority(
            &self,
            _status: QueueStatus,
            _limit: usize,
            _priority_levels: &[Priority],
        ) -> Result<Vec<QueueEntry>, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }

        async fn update_entry(&self, _queue_id: &str, _patch: EntryPatch) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }

        async fn get_stats(&self, _customer_id: Option<&str>) -> Result<QueueStats, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }

        async fn get_rate_limit_state(&self, _customer_id: &str) -> Result<RateLimitState, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }

        async fn update_rate_limit_state(
            &self,
            _customer_id: &str,
            _patch: RateLimitPatch,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
    }

    fn rate_control(delay_seconds: u64) -> RateControl {
        RateControl {
            delay_between_batches_seconds: delay_seconds,
            ..Default::default()
        }
    }

    fn memory_limiter() -> (Arc<MemoryQueueStorage>, BatchRateLimiter) {
        let storage = Arc::new(MemoryQueueStorage::new());
        (storage.clone(), BatchRateLimiter::new(storage))
    }

    fn entry(retry_count: u32, last_attempt_at: Option<i64>) -> QueueEntry {
        QueueEntry {
            queue_id: "q-1".to_string(),
            customer_id: "cust-1".to_string(),
            device_id: "dev".to_string(),
            device_profile: "TRAFO".to_string(),
            priority: Some(Priority::Critical),
            payload: NotificationPayload {
                text: "offline".to_string(),
                device_name: "TR-1".to_string(),
                msg_type: None,
                raw: Value::Null,
            },
            status: QueueStatus::Retry,
            retry_count,
            max_retries: 3,
            created_at: 0,
            last_attempt_at,
            sent_at: None,
            http_status: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_never_dispatched_can_send() {
        let (_, limiter) = memory_limiter();
        assert!(limiter.can_send_batch_at("cust-1", &rate_control(60), NOW).await);
        assert_eq!(limiter.get_wait_time_at("cust-1", &rate_control(60), NOW).await, 0);
    }

    #[tokio::test]
    async fn test_delay_enforced_after_dispatch() {
        let (_, limiter) = memory_limiter();
        let rc = rate_control(60);
        limiter.record_batch_dispatch_at("cust-1", 5, NOW).await;

        assert!(!limiter.can_send_batch_at("cust-1", &rc, NOW + 30_000).await);
        assert_eq!(limiter.get_wait_time_at("cust-1", &rc, NOW + 30_000).await, 30_000);

        assert!(limiter.can_send_batch_at("cust-1", &rc, NOW + 60_000).await);
        assert_eq!(limiter.get_wait_time_at("cust-1", &rc, NOW + 90_000).await, 0);

        // Other customers are paced independently
        assert!(limiter.can_send_batch_at("cust-2", &rc, NOW + 1).await);
    }

    #[tokio::test]
    async fn test_record_increments_batch_count() {
        let (storage, limiter) = memory_limiter();
        limiter.record_batch_dispatch_at("cust-1", 5, NOW).await;
        limiter.record_batch_dispatch_at("cust-1", 3, NOW + 70_000).await;

        let state = storage.get_rate_limit_state("cust-1").await.unwrap();
        assert_eq!(state.last_dispatch_at, NOW + 70_000);
        assert_eq!(state.batch_count, 2);
    }

    #[tokio::test]
    async fn test_fails_open_on_storage_error() {
        let limiter = BatchRateLimiter::new(Arc::new(UnavailableStorage));
        let rc = rate_control(60);

        assert!(limiter.can_send_batch_at("cust-1", &rc, NOW).await);
        assert!(limiter.apply_rate_limit_at("cust-1", &rc, NOW).await);
        assert_eq!(limiter.get_wait_time_at("cust-1", &rc, NOW).await, 0);

        // Swallowed
        limiter.record_batch_dispatch("cust-1", 5).await;

        assert!(limiter.get_rate_limit_stats("cust-1", &rc).await.is_err());
        assert!(limiter.reset_rate_limit_state("cust-1").await.is_err());
    }

    #[tokio::test]
    async fn test_apply_rate_limit() {
        let (_, limiter) = memory_limiter();
        let rc = rate_control(60);
        assert!(limiter.apply_rate_limit_at("cust-1", &rc, NOW).await);

        limiter.record_batch_dispatch_at("cust-1", 5, NOW).await;
        assert!(!limiter.apply_rate_limit_at("cust-1", &rc, NOW + 1_000).await);
    }

    #[tokio::test]
    async fn test_stats_and_reset() {
        let (_, limiter) = memory_limiter();
        let rc = rate_control(60);

        let fresh = limiter.get_rate_limit_stats_at("cust-1", &rc, NOW).await.unwrap();
        assert_eq!(fresh.time_since_last_dispatch_seconds, None);
        assert!(fresh.can_send_now);
        assert_eq!(fresh.wait_time_seconds, 0);

        limiter.record_batch_dispatch_at("cust-1", 5, NOW).await;
        let stats = limiter
            .get_rate_limit_stats_at("cust-1", &rc, NOW + 20_500)
            .await
            .unwrap();
        assert_eq!(stats.last_dispatch_at, NOW);
        assert_eq!(stats.batch_count, 1);
        assert_eq!(stats.time_since_last_dispatch_seconds, Some(20));
        assert!(!stats.can_send_now);
        assert_eq!(stats.wait_time_seconds, 40);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["canSendNow"], serde_json::json!(false));

        limiter.reset_rate_limit_state("cust-1").await.unwrap();
        let reset = limiter.get_rate_limit_stats_at("cust-1", &rc, NOW).await.unwrap();
        assert_eq!(reset.last_dispatch_at, 0);
        assert_eq!(reset.batch_count, 0);
        assert!(reset.can_send_now);
    }

    #[test]
    fn test_should_retry_now() {
        let rc = RateControl {
            retry_backoff: RetryBackoff::Exponential,
            retry_base_delay_seconds: 10,
            ..Default::default()
        };

        assert!(should_retry_now_at(&entry(0, None), &rc, NOW));

        // Second retry waits 10s * 2^2
        let attempted = entry(2, Some(NOW));
        assert!(!should_retry_now_at(&attempted, &rc, NOW + 39_999));
        assert!(should_retry_now_at(&attempted, &rc, NOW + 40_000));
    }

    #[test]
    fn test_next_retry_time() {
        let rc = RateControl {
            retry_backoff: RetryBackoff::Linear,
            retry_base_delay_seconds: 10,
            ..Default::default()
        };

        assert_eq!(get_next_retry_time_at(&entry(1, None), &rc, NOW), NOW);
        assert_eq!(get_next_retry_time_at(&entry(1, Some(NOW)), &rc, NOW + 5), NOW + 20_000);
    }
}
