//! Queue data models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::priority::Priority;

use super::error::QueueError;

/// Current time in epoch milliseconds
pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Delivery status of a queue entry.
///
/// `PENDING -> SENDING -> SENT | FAILED | RETRY`, and `RETRY` loops back
/// through `SENDING` until retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Retry,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 5] = [
        QueueStatus::Pending,
        QueueStatus::Sending,
        QueueStatus::Sent,
        QueueStatus::Failed,
        QueueStatus::Retry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Sending => "SENDING",
            QueueStatus::Sent => "SENT",
            QueueStatus::Failed => "FAILED",
            QueueStatus::Retry => "RETRY",
        }
    }

    /// Whether the entry is still waiting for a dispatch attempt
    pub fn is_awaiting_dispatch(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Retry)
    }
}

impl AsRef<str> for QueueStatus {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| QueueError::InvalidStatus(s.to_string()))
    }
}

/// Notification content carried by a queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Alert text
    pub text: String,
    /// Device name as reported by the rule engine
    pub device_name: String,
    /// Rule-engine message type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
    /// The inbound message body, untouched
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// One notification awaiting or having undergone delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Unique entry ID
    pub queue_id: String,
    pub customer_id: String,
    pub device_id: String,
    pub device_profile: String,
    /// Set by the priority resolver before enqueue
    pub priority: Option<Priority>,
    pub payload: NotificationPayload,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Epoch millis
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QueueEntry {
    /// Set the priority, consuming the entry
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Whether another retry is allowed
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Apply a partial update. Fields absent from the patch are untouched.
    pub fn apply_patch(&mut self, patch: &EntryPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ts) = patch.last_attempt_at {
            self.last_attempt_at = Some(ts);
        }
        if let Some(ts) = patch.sent_at {
            self.sent_at = Some(ts);
        }
        if let Some(code) = patch.http_status {
            self.http_status = Some(code);
        }
        if let Some(ref message) = patch.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(count) = patch.retry_count {
            self.retry_count = count;
        }
    }
}

/// Partial update applied by `QueueStorage::update_entry`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueueStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Outcome of a delivery attempt, as reported by the dispatcher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResult {
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    /// New retry count, used for RETRY transitions
    pub retry_count: Option<u32>,
}

impl StatusResult {
    pub fn sent(http_status: u16) -> Self {
        Self {
            http_status: Some(http_status),
            ..Default::default()
        }
    }

    pub fn failed(http_status: Option<u16>, error_message: impl Into<String>) -> Self {
        Self {
            http_status,
            error_message: Some(error_message.into()),
            retry_count: None,
        }
    }

    pub fn retry(retry_count: u32) -> Self {
        Self {
            retry_count: Some(retry_count),
            ..Default::default()
        }
    }
}

/// Awaiting-dispatch depth per priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    #[serde(rename = "1")]
    pub critical: u64,
    #[serde(rename = "2")]
    pub high: u64,
    #[serde(rename = "3")]
    pub medium: u64,
    #[serde(rename = "4")]
    pub low: u64,
}

impl QueueDepth {
    pub fn get(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn add(&mut self, priority: Priority, count: u64) {
        let slot = match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        };
        *slot += count;
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Snapshot of queue contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_depth: QueueDepth,
    pub pending_count: u64,
    pub failed_count: u64,
    pub retry_count: u64,
    pub sent_count: u64,
    /// Mean of `sent_at - created_at` over sent entries
    pub average_dispatch_delay_seconds: f64,
}

/// Per-customer dispatch bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    /// Epoch millis of the last batch, 0 when never dispatched
    pub last_dispatch_at: i64,
    pub batch_count: u64,
}

impl RateLimitState {
    pub fn apply_patch(&mut self, patch: &RateLimitPatch) {
        if let Some(ts) = patch.last_dispatch_at {
            self.last_dispatch_at = ts;
        }
        if let Some(count) = patch.batch_count {
            self.batch_count = count;
        }
    }
}

/// Partial update applied by `QueueStorage::update_rate_limit_state`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitPatch {
    pub last_dispatch_at: Option<i64>,
    pub batch_count: Option<u64>,
}
