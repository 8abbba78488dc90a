use thiserror::Error;

use crate::redis::pool::PoolError;

/// Errors raised by a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No entry with this queue ID
    #[error("Queue entry not found: {0}")]
    NotFound(String),

    /// An entry with this queue ID already exists
    #[error("Queue entry already exists: {0}")]
    Duplicate(String),

    /// The entry cannot be stored as given
    #[error("Invalid queue entry: {0}")]
    Invalid(String),

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for StorageError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => StorageError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => StorageError::Unavailable(msg),
        }
    }
}

/// Errors raised by the queue core.
///
/// Everything except `Storage` is an integration mistake and is never
/// retried automatically.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage adapter is required")]
    MissingStorage,

    #[error("Priority must be set before enqueue")]
    PriorityNotSet,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
