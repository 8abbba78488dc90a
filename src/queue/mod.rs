//! Priority queue of Telegram alert notifications.
//!
//! Inbound rule-engine messages are normalized into [`QueueEntry`] values,
//! given a priority by the resolver, and stored through a [`QueueStorage`]
//! adapter. [`TelegramQueue`] hands them out most urgent first and records
//! each delivery outcome.
//!
//! # Storage backends
//!
//! - `memory`: DashMap-backed, process local
//! - `redis`: persistent, sorted-set indexes per status and priority

mod backend;
mod error;
mod factory;
mod memory_backend;
mod models;
mod normalize;
mod redis_backend;
mod service;

pub use backend::QueueStorage;
pub use error::{QueueError, StorageError};
pub use factory::create_queue_storage;
pub use memory_backend::MemoryQueueStorage;
pub use models::{
    current_time_ms, EntryPatch, NotificationPayload, QueueDepth, QueueEntry, QueueStats,
    QueueStatus, RateLimitPatch, RateLimitState, StatusResult,
};
pub use normalize::{
    normalize_payload, ExecutionContext, MessageMetadata, RuleEngineMessage, DEFAULT_MAX_RETRIES,
};
pub use redis_backend::RedisQueueStorage;
pub use service::{should_retry, TelegramQueue, TelegramQueueBuilder};
