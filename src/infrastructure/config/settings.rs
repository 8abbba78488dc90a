use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub attributes: AttributeApiConfig,
    #[serde(default)]
    pub priority_cache: PriorityCacheConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage adapter selection
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: "memory" or "redis" (default: "memory")
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Redis key prefix for queue data
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Customer attribute API holding per-customer priority configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeApiConfig {
    /// Base URL of the host platform, e.g. `https://dashboard.example.com`
    pub base_url: String,
    /// Bearer token sent as `X-Authorization`
    pub token: String,
    /// Attribute key whose value is the JSON configuration
    #[serde(default = "default_attribute_key")]
    pub attribute_key: String,
    /// Attribute scope segment of the URL
    #[serde(default = "default_attribute_scope")]
    pub scope: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityCacheConfig {
    /// Time-to-live for cached customer configs in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Retry ceiling applied by `normalize_payload` when the caller gives none
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_redis_prefix() -> String {
    "telegram_queue".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_attribute_key() -> String {
    "telegramPriorityConfig".to_string()
}

fn default_attribute_scope() -> String {
    "SERVER_SCOPE".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("storage.backend", "memory")?
            .set_default("storage.redis_prefix", "telegram_queue")?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("priority_cache.ttl_seconds", 300)?
            .set_default("queue.default_max_retries", 3)?
            .set_default("logging.level", "info")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // TELEGRAM_QUEUE__ATTRIBUTES__BASE_URL, TELEGRAM_QUEUE__STORAGE__BACKEND, ...
            .add_source(
                Environment::with_prefix("TELEGRAM_QUEUE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Whether the Redis storage adapter was selected
    pub fn uses_redis(&self) -> bool {
        self.storage.backend == "redis"
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            redis_prefix: default_redis_prefix(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl AttributeApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            attribute_key: default_attribute_key(),
            scope: default_attribute_scope(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for PriorityCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
