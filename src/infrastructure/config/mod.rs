mod settings;

pub use settings::{
    AttributeApiConfig, LoggingConfig, PriorityCacheConfig, QueueSettings, RedisConfig, Settings,
    StorageConfig,
};
