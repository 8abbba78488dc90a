//! Priority levels and per-customer priority configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Urgency tier of an alert. Lower numeric value means more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
#[repr(u8)]
pub enum Priority {
    /// Immediate delivery required
    Critical = 1,
    /// Should be delivered promptly
    High = 2,
    /// Default tier
    Medium = 3,
    /// Can wait behind everything else
    Low = 4,
}

impl Priority {
    /// Every level, most urgent first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Numeric value (1..=4)
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

/// An integer outside the 1..=4 priority range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid priority: {0} (expected 1-4)")]
pub struct InvalidPriority(pub i64);

impl TryFrom<i64> for Priority {
    type Error = InvalidPriority;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Critical),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Medium),
            4 => Ok(Priority::Low),
            other => Err(InvalidPriority(other)),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidPriority;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::try_from(i64::from(value))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        write!(f, "{}", name)
    }
}

/// Retry back-off strategy for failed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    /// `base * 2^retry_count`
    #[default]
    Exponential,
    /// `base * (retry_count + 1)`
    Linear,
}

impl RetryBackoff {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryBackoff::Exponential => "exponential",
            RetryBackoff::Linear => "linear",
        }
    }
}

/// Unknown back-off strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid retry backoff: {0} (expected 'exponential' or 'linear')")]
pub struct InvalidRetryBackoff(pub String);

impl FromStr for RetryBackoff {
    type Err = InvalidRetryBackoff;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential" => Ok(RetryBackoff::Exponential),
            "linear" => Ok(RetryBackoff::Linear),
            other => Err(InvalidRetryBackoff(other.to_string())),
        }
    }
}

/// Priority rules configured for one customer.
///
/// Values stay as raw integers; lookups skip anything outside 1..=4 so a
/// single bad rule does not void the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityRules {
    /// deviceProfile -> priority
    #[serde(default)]
    pub device_profiles: HashMap<String, i64>,
    /// deviceId -> priority (highest precedence)
    #[serde(default)]
    pub device_overrides: HashMap<String, i64>,
    /// Customer-wide fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_default: Option<i64>,
}

impl PriorityRules {
    /// Override configured for a device, if valid.
    pub fn device_override(&self, device_id: &str) -> Option<Priority> {
        self.device_overrides
            .get(device_id)
            .and_then(|v| Priority::try_from(*v).ok())
    }

    /// Rule configured for a device profile, if valid.
    pub fn profile_rule(&self, device_profile: &str) -> Option<Priority> {
        self.device_profiles
            .get(device_profile)
            .and_then(|v| Priority::try_from(*v).ok())
    }

    /// Customer-wide default, if valid.
    pub fn customer_default(&self) -> Option<Priority> {
        self.global_default.and_then(|v| Priority::try_from(v).ok())
    }
}

/// Dispatch pacing and retry policy for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateControl {
    /// Entries per dispatch batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Minimum gap between two batches for the same customer
    #[serde(default = "default_delay_between_batches")]
    pub delay_between_batches_seconds: u64,
    /// Retry ceiling for failed sends
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Back-off strategy between retries
    #[serde(default)]
    pub retry_backoff: RetryBackoff,
    /// Base delay fed into the back-off formula
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_seconds: u64,
}

pub(crate) fn default_batch_size() -> u32 {
    5
}

pub(crate) fn default_delay_between_batches() -> u64 {
    60
}

pub(crate) fn default_max_retries() -> u32 {
    3
}

pub(crate) fn default_retry_base_delay() -> u64 {
    10
}

impl Default for RateControl {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches_seconds: default_delay_between_batches(),
            max_retries: default_max_retries(),
            retry_backoff: RetryBackoff::default(),
            retry_base_delay_seconds: default_retry_base_delay(),
        }
    }
}

impl RateControl {
    /// All numeric fields must be strictly positive.
    pub fn is_valid(&self) -> bool {
        self.batch_size > 0
            && self.delay_between_batches_seconds > 0
            && self.max_retries > 0
            && self.retry_base_delay_seconds > 0
    }

    /// Minimum delay between batches in milliseconds.
    pub fn delay_between_batches_ms(&self) -> u64 {
        self.delay_between_batches_seconds.saturating_mul(1000)
    }
}

/// Telegram delivery target. Consumed by the dispatcher, not by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

/// Per-customer notification configuration stored as a customer attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPriorityConfig {
    /// Whether the customer's rules apply at all
    pub enabled: bool,
    /// Priority rules
    pub priority_rules: PriorityRules,
    /// Pacing and retry policy
    #[serde(default)]
    pub rate_control: RateControl,
    /// Delivery target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramTarget>,
}
