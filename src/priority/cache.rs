//! Time-boxed cache of customer priority configurations.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::types::CustomerPriorityConfig;

/// Default time-to-live for cached configurations (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedConfig {
    config: CustomerPriorityConfig,
    cached_at: Instant,
}

/// Snapshot of the cache contents
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub customer_ids: Vec<String>,
    pub ttl_ms: u64,
}

/// Customer-keyed TTL cache, safe to share between tasks.
///
/// Instances are independent, so tests and tenants never see each other's
/// entries.
pub struct PriorityConfigCache {
    entries: DashMap<String, CachedConfig>,
    ttl: Duration,
}

impl Default for PriorityConfigCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl PriorityConfigCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, evicting it if it has expired.
    pub fn get(&self, customer_id: &str) -> Option<CustomerPriorityConfig> {
        {
            let entry = self.entries.get(customer_id)?;
            if entry.cached_at.elapsed() < self.ttl {
                return Some(entry.config.clone());
            }
        }

        // read guard must be released before removing
        self.entries
            .remove_if(customer_id, |_, entry| entry.cached_at.elapsed() >= self.ttl);
        tracing::trace!(customer_id = %customer_id, "Evicted expired priority config");
        None
    }

    /// Store a configuration, replacing any previous entry.
    pub fn insert(&self, customer_id: &str, config: CustomerPriorityConfig) {
        self.entries.insert(
            customer_id.to_string(),
            CachedConfig {
                config,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for one customer. Returns whether one existed.
    pub fn invalidate(&self, customer_id: &str) -> bool {
        let removed = self.entries.remove(customer_id).is_some();
        if removed {
            tracing::debug!(customer_id = %customer_id, "Invalidated priority config cache");
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        let size = self.entries.len();
        self.entries.clear();
        tracing::debug!(cleared = size, "Cleared priority config cache");
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut customer_ids: Vec<String> =
            self.entries.iter().map(|r| r.key().clone()).collect();
        customer_ids.sort();

        CacheStats {
            size: customer_ids.len(),
            customer_ids,
            ttl_ms: self.ttl.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::defaults::build_default_customer_config;

    fn sample_config() -> CustomerPriorityConfig {
        build_default_customer_config(None).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = PriorityConfigCache::default();
        assert!(cache.get("cust-1").is_none());

        cache.insert("cust-1", sample_config());
        assert_eq!(cache.get("cust-1"), Some(sample_config()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = PriorityConfigCache::new(Duration::ZERO);
        cache.insert("cust-1", sample_config());

        assert!(cache.get("cust-1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = PriorityConfigCache::default();
        cache.insert("cust-1", sample_config());
        cache.insert("cust-2", sample_config());

        assert!(cache.invalidate("cust-1"));
        assert!(!cache.invalidate("cust-1"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = PriorityConfigCache::new(Duration::ZERO);
        cache.insert("cust-1", sample_config());
        cache.insert("cust-2", sample_config());

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats() {
        let cache = PriorityConfigCache::default();
        cache.insert("cust-b", sample_config());
        cache.insert("cust-a", sample_config());

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.customer_ids, vec!["cust-a", "cust-b"]);
        assert_eq!(stats.ttl_ms, 300_000);
    }

    #[test]
    fn test_caches_are_isolated() {
        let first = PriorityConfigCache::default();
        let second = PriorityConfigCache::default();
        first.insert("cust-1", sample_config());

        assert!(second.get("cust-1").is_none());
    }
}
