use thiserror::Error;

use crate::priority::PriorityError;
use crate::queue::{QueueError, StorageError};
use crate::redis::PoolError;
use crate::telemetry::TelemetryError;

/// Top-level error for bootstrapping and host integration.
///
/// Each component keeps its own error type; this one wraps them so a host
/// can use a single `Result` at its boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Priority resolution error: {0}")]
    Priority(#[from] PriorityError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl AppError {
    /// Short machine-readable code, used as a log field
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Priority(_) => "PRIORITY_ERROR",
            AppError::Queue(QueueError::Storage(_)) => "STORAGE_ERROR",
            AppError::Queue(_) => "QUEUE_ERROR",
            AppError::Pool(_) => "REDIS_ERROR",
            AppError::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
