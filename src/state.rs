use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::Result;
use crate::priority::{PriorityConfigCache, PriorityResolver, ResolvedPriority};
use crate::queue::{
    create_queue_storage, normalize_payload, ExecutionContext, QueueEntry, QueueStorage,
    RuleEngineMessage, TelegramQueue,
};
use crate::ratelimit::BatchRateLimiter;
use crate::redis::RedisPool;

/// Wired-up components sharing one storage adapter and one config cache.
#[derive(Clone)]
pub struct QueueServices {
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn QueueStorage>,
    pub cache: Arc<PriorityConfigCache>,
    pub resolver: Arc<PriorityResolver>,
    pub queue: TelegramQueue,
    pub rate_limiter: Arc<BatchRateLimiter>,
}

impl QueueServices {
    /// Build every component from settings.
    ///
    /// A Redis pool is created only when the Redis backend is selected.
    /// It connects lazily, so this succeeds while Redis is down.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let redis_pool = if settings.uses_redis() {
            Some(Arc::new(RedisPool::new(settings.redis.clone())?))
        } else {
            None
        };

        let storage = create_queue_storage(&settings.storage, redis_pool);
        Self::with_storage(settings, storage)
    }

    /// Build with a caller-supplied storage adapter
    pub fn with_storage(settings: &Settings, storage: Arc<dyn QueueStorage>) -> Result<Self> {
        let cache = Arc::new(PriorityConfigCache::new(Duration::from_secs(
            settings.priority_cache.ttl_seconds,
        )));
        let resolver = Arc::new(PriorityResolver::new(
            settings.attributes.clone(),
            cache.clone(),
        )?);
        let queue = TelegramQueue::builder().storage(storage.clone()).build()?;
        let rate_limiter = Arc::new(BatchRateLimiter::new(storage.clone()));

        tracing::info!(
            backend = storage.backend_type(),
            cache_ttl_seconds = settings.priority_cache.ttl_seconds,
            "Queue services initialized"
        );

        Ok(Self {
            settings: Arc::new(settings.clone()),
            storage,
            cache,
            resolver,
            queue,
            rate_limiter,
        })
    }

    /// Normalize an inbound message and give it a priority, without storing it
    pub async fn prepare_alert(
        &self,
        message: &RuleEngineMessage,
        context: &ExecutionContext,
    ) -> (QueueEntry, ResolvedPriority) {
        let mut context = context.clone();
        context
            .max_retries
            .get_or_insert(self.settings.queue.default_max_retries);

        let entry = normalize_payload(message, &context);
        let resolved = self
            .resolver
            .resolve(&entry.customer_id, &entry.device_id, &entry.device_profile)
            .await;

        (entry.with_priority(resolved.priority), resolved)
    }

    /// Normalize, prioritize and enqueue an inbound message. Returns the queue ID.
    pub async fn submit_alert(
        &self,
        message: &RuleEngineMessage,
        context: &ExecutionContext,
    ) -> Result<String> {
        let (entry, resolved) = self.prepare_alert(message, context).await;
        let queue_id = self.queue.enqueue(&entry).await?;

        tracing::info!(
            queue_id = %queue_id,
            customer_id = %entry.customer_id,
            priority = resolved.priority.as_u8(),
            source = resolved.source.as_str(),
            "Alert queued"
        );

        Ok(queue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AttributeApiConfig, LoggingConfig, PriorityCacheConfig, QueueSettings, RedisConfig,
        StorageConfig,
    };

    fn settings(backend: &str) -> Settings {
        Settings {
            storage: StorageConfig {
                backend: backend.to_string(),
                ..Default::default()
            },
            redis: RedisConfig::default(),
            attributes: AttributeApiConfig::new("http://127.0.0.1:9", "token"),
            priority_cache: PriorityCacheConfig { ttl_seconds: 60 },
            queue: QueueSettings {
                default_max_retries: 5,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_from_settings_memory() {
        let services = QueueServices::from_settings(&settings("memory")).unwrap();
        assert_eq!(services.storage.backend_type(), "memory");
        assert_eq!(services.cache.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_settings_redis_does_not_connect() {
        let services = QueueServices::from_settings(&settings("redis")).unwrap();
        assert_eq!(services.storage.backend_type(), "redis");
    }

    #[tokio::test]
    async fn test_prepare_alert_applies_default_retries() {
        let services = QueueServices::from_settings(&settings("memory")).unwrap();
        let message: RuleEngineMessage = serde_json::from_value(serde_json::json!({
            "msg": {"text": "Substation offline"},
            "metadata": {"deviceType": "SUBESTACAO", "deviceName": "SE-01"}
        }))
        .unwrap();
        let context = ExecutionContext {
            device_id: Some("dev-1".to_string()),
            customer_id: Some("cust-1".to_string()),
            max_retries: None,
        };

        // Attribute API unreachable: resolution falls back to MEDIUM
        let (entry, resolved) = services.prepare_alert(&message, &context).await;
        assert_eq!(entry.max_retries, 5);
        assert_eq!(entry.priority, Some(resolved.priority));
        assert_eq!(resolved.priority, crate::priority::Priority::Medium);
    }
}
