//! Queue storage factory

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::redis::pool::RedisPool;

use super::backend::QueueStorage;
use super::memory_backend::MemoryQueueStorage;
use super::redis_backend::RedisQueueStorage;

/// Create a queue storage adapter based on configuration.
///
/// - `"redis"`: a `RedisQueueStorage` if a Redis pool is provided
/// - anything else (default `"memory"`): a `MemoryQueueStorage`
///
/// # Example
///
/// ```rust,ignore
/// let storage = create_queue_storage(&settings.storage, Some(redis_pool.clone()));
/// ```
pub fn create_queue_storage(
    settings: &StorageConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn QueueStorage> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis queue storage"
                );
                Arc::new(RedisQueueStorage::new(pool, settings.redis_prefix.clone()))
            } else {
                tracing::warn!(
                    "Redis storage requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryQueueStorage::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory queue storage");
            Arc::new(MemoryQueueStorage::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    fn storage_config(backend: &str) -> StorageConfig {
        StorageConfig {
            backend: backend.to_string(),
            redis_prefix: "tq".to_string(),
        }
    }

    #[test]
    fn test_memory_by_default() {
        let storage = create_queue_storage(&storage_config("memory"), None);
        assert_eq!(storage.backend_type(), "memory");

        let storage = create_queue_storage(&storage_config("something-else"), None);
        assert_eq!(storage.backend_type(), "memory");
    }

    #[test]
    fn test_redis_without_pool_falls_back() {
        let storage = create_queue_storage(&storage_config("redis"), None);
        assert_eq!(storage.backend_type(), "memory");
    }

    #[test]
    fn test_redis_with_pool() {
        let pool = RedisPool::new(RedisConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .unwrap();
        let storage = create_queue_storage(&storage_config("redis"), Some(Arc::new(pool)));
        assert_eq!(storage.backend_type(), "redis");
    }
}
