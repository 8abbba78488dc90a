//! Priority resolution backed by the host platform's customer attributes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AttributeApiConfig;
use crate::metrics::PriorityMetrics;

use super::cache::{CacheStats, PriorityConfigCache};
use super::defaults::{get_device_profile_default_priority, global_fallback_priority};
use super::error::PriorityError;
use super::types::{CustomerPriorityConfig, Priority};
use super::validation::parse_customer_config;

/// Which rule produced a resolved priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrioritySource {
    DeviceOverride,
    DeviceProfile,
    CustomerDefault,
    ProfileDefault,
    GlobalFallback,
}

impl PrioritySource {
    pub fn as_str(self) -> &'static str {
        match self {
            PrioritySource::DeviceOverride => "device_override",
            PrioritySource::DeviceProfile => "device_profile",
            PrioritySource::CustomerDefault => "customer_default",
            PrioritySource::ProfileDefault => "profile_default",
            PrioritySource::GlobalFallback => "global_fallback",
        }
    }
}

/// A priority together with the rule it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPriority {
    pub priority: Priority,
    pub source: PrioritySource,
}

impl ResolvedPriority {
    fn new(priority: Priority, source: PrioritySource) -> Self {
        Self { priority, source }
    }
}

/// Walk the resolution chain for one alert. First match wins:
/// device override, profile rule, customer default, then the static
/// profile table. A disabled config is ignored.
pub fn resolve_from_config(
    config: Option<&CustomerPriorityConfig>,
    device_id: &str,
    device_profile: &str,
) -> ResolvedPriority {
    if let Some(config) = config.filter(|c| c.enabled) {
        let rules = &config.priority_rules;

        if let Some(p) = rules.device_override(device_id) {
            return ResolvedPriority::new(p, PrioritySource::DeviceOverride);
        }
        if let Some(p) = rules.profile_rule(device_profile) {
            return ResolvedPriority::new(p, PrioritySource::DeviceProfile);
        }
        if let Some(p) = rules.customer_default() {
            return ResolvedPriority::new(p, PrioritySource::CustomerDefault);
        }
    }

    ResolvedPriority::new(
        get_device_profile_default_priority(device_profile),
        PrioritySource::ProfileDefault,
    )
}

/// One element of the attribute API response array
#[derive(Debug, Deserialize)]
struct AttributeEntry {
    key: String,
    value: Value,
}

/// Resolves alert priorities from per-customer configuration.
///
/// Configurations are fetched from the host platform's attribute API and
/// kept in an injected [`PriorityConfigCache`].
pub struct PriorityResolver {
    client: Client,
    api: AttributeApiConfig,
    cache: Arc<PriorityConfigCache>,
}

impl PriorityResolver {
    /// Create a resolver with its own HTTP client
    pub fn new(
        api: AttributeApiConfig,
        cache: Arc<PriorityConfigCache>,
    ) -> Result<Self, PriorityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()?;

        tracing::info!(
            base_url = %api.base_url,
            attribute_key = %api.attribute_key,
            cache_ttl_ms = cache.ttl().as_millis() as u64,
            "Priority resolver initialized"
        );

        Ok(Self { client, api, cache })
    }

    /// Create a resolver reusing an existing HTTP client
    pub fn with_client(
        client: Client,
        api: AttributeApiConfig,
        cache: Arc<PriorityConfigCache>,
    ) -> Self {
        Self { client, api, cache }
    }

    pub fn cache(&self) -> &Arc<PriorityConfigCache> {
        &self.cache
    }

    /// Attribute endpoint for one customer. The customer ID and scope are
    /// pushed as path segments, so reserved characters are percent-encoded.
    fn attributes_url(&self, customer_id: &str) -> Result<Url, PriorityError> {
        let invalid = || PriorityError::InvalidUrl(self.api.base_url.clone());
        let mut url = Url::parse(&self.api.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["api", "plugins", "telemetry", "CUSTOMER", customer_id])
            .extend(["values", "attributes", self.api.scope.as_str()]);
        Ok(url)
    }

    /// Fetch the customer's priority configuration.
    ///
    /// `Ok(None)` means the customer has no usable configuration (404,
    /// missing attribute, or a document that fails structural checks).
    /// Transport failures and other HTTP errors are returned as errors.
    pub async fn fetch_customer_priority_rules(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerPriorityConfig>, PriorityError> {
        if let Some(config) = self.cache.get(customer_id) {
            PriorityMetrics::record_cache_hit();
            tracing::trace!(customer_id = %customer_id, "Priority config served from cache");
            return Ok(Some(config));
        }
        PriorityMetrics::record_cache_miss();

        let url = self.attributes_url(customer_id)?;
        tracing::debug!(customer_id = %customer_id, url = %url, "Fetching customer priority config");

        let response = self
            .client
            .get(url)
            .query(&[("keys", self.api.attribute_key.as_str())])
            .header("X-Authorization", format!("Bearer {}", self.api.token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(customer_id = %customer_id, "No priority config for customer");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PriorityError::Http {
                status: status.as_u16(),
                customer_id: customer_id.to_string(),
            });
        }

        let body: Value = response.json().await?;
        let config = match self.extract_config(&body) {
            Some(raw) => parse_customer_config(&raw),
            None => {
                tracing::debug!(
                    customer_id = %customer_id,
                    attribute_key = %self.api.attribute_key,
                    "Priority config attribute not present"
                );
                return Ok(None);
            }
        };

        match config {
            Some(config) => {
                self.cache.insert(customer_id, config.clone());
                Ok(Some(config))
            }
            None => {
                tracing::warn!(
                    customer_id = %customer_id,
                    "Customer priority config failed validation, ignoring"
                );
                Ok(None)
            }
        }
    }

    /// Pull the configured attribute out of the response body. The value is
    /// normally a JSON-encoded string; an inline object is accepted as well.
    fn extract_config(&self, body: &Value) -> Option<Value> {
        let entries: Vec<AttributeEntry> = serde_json::from_value(body.clone()).ok()?;
        let entry = entries
            .into_iter()
            .find(|e| e.key == self.api.attribute_key)?;

        match entry.value {
            Value::String(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Priority config attribute is not valid JSON");
                    Some(Value::Null)
                }
            },
            value @ Value::Object(_) => Some(value),
            _ => Some(Value::Null),
        }
    }

    /// Resolve a priority for an alert. Never fails: fetch errors collapse
    /// to the global fallback.
    pub async fn resolve(
        &self,
        customer_id: &str,
        device_id: &str,
        device_profile: &str,
    ) -> ResolvedPriority {
        let resolved = match self.fetch_customer_priority_rules(customer_id).await {
            Ok(config) => resolve_from_config(config.as_ref(), device_id, device_profile),
            Err(e) => {
                PriorityMetrics::record_fetch_error();
                tracing::warn!(
                    customer_id = %customer_id,
                    device_id = %device_id,
                    error = %e,
                    "Failed to fetch priority config, using global fallback"
                );
                ResolvedPriority::new(global_fallback_priority(), PrioritySource::GlobalFallback)
            }
        };

        PriorityMetrics::record_resolved(resolved.source.as_str());
        tracing::debug!(
            customer_id = %customer_id,
            device_id = %device_id,
            device_profile = %device_profile,
            priority = resolved.priority.as_u8(),
            source = resolved.source.as_str(),
            "Resolved alert priority"
        );

        resolved
    }

    /// Resolve just the priority value
    pub async fn resolve_priority(
        &self,
        customer_id: &str,
        device_id: &str,
        device_profile: &str,
    ) -> Priority {
        self.resolve(customer_id, device_id, device_profile)
            .await
            .priority
    }

    pub fn invalidate_cache(&self, customer_id: &str) -> bool {
        self.cache.invalidate(customer_id)
    }

    pub fn clear_all_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
