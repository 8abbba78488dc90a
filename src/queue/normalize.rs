//! Conversion of inbound rule-engine messages into queue entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::models::{current_time_ms, NotificationPayload, QueueEntry, QueueStatus};

const UNKNOWN: &str = "unknown";

/// Retry ceiling used when the caller supplies none
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Metadata attached by the rule engine. Values usually arrive as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Epoch millis as a string or a number
    #[serde(default)]
    pub ts: Option<Value>,
}

impl MessageMetadata {
    fn timestamp(&self) -> Option<i64> {
        match self.ts.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Message handed over by the rule engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEngineMessage {
    #[serde(default)]
    pub msg: Value,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub msg_type: Option<String>,
}

/// Execution context supplied by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Overrides the default retry ceiling
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn or_unknown(value: Option<&String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn alert_text(msg: &Value) -> String {
    match msg.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => match msg {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// Build a fresh `PENDING` entry from an inbound message.
///
/// Pure apart from the generated ID and the clock fallback for `ts`. The
/// priority is left unset for the resolver to fill in.
pub fn normalize_payload(message: &RuleEngineMessage, context: &ExecutionContext) -> QueueEntry {
    let metadata = &message.metadata;

    QueueEntry {
        queue_id: Uuid::new_v4().to_string(),
        customer_id: or_unknown(context.customer_id.as_ref()),
        device_id: or_unknown(context.device_id.as_ref()),
        device_profile: or_unknown(metadata.device_type.as_ref()),
        priority: None,
        payload: NotificationPayload {
            text: alert_text(&message.msg),
            device_name: or_unknown(metadata.device_name.as_ref()),
            msg_type: message.msg_type.clone(),
            raw: message.msg.clone(),
        },
        status: QueueStatus::Pending,
        retry_count: 0,
        max_retries: context.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        created_at: metadata.timestamp().unwrap_or_else(current_time_ms),
        last_attempt_at: None,
        sent_at: None,
        http_status: None,
        error_message: None,
    }
}
