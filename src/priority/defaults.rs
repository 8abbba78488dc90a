//! Built-in priority classification and default customer configuration.

use serde_json::{json, Value};

use super::error::PriorityError;
use super::types::{CustomerPriorityConfig, Priority};

/// Profiles whose alerts are always urgent (power entry, clocks, transformers).
const CRITICAL_PROFILES: &[&str] = &["ENTRADA", "RELOGIO", "TRAFO", "SUBESTACAO"];

/// Profiles seeded into [`build_default_customer_config`].
const DEFAULT_PROFILE_TABLE: &[(&str, Priority)] = &[
    ("ENTRADA", Priority::Critical),
    ("RELOGIO", Priority::Critical),
    ("TRAFO", Priority::Critical),
    ("SUBESTACAO", Priority::Critical),
    ("3F_MEDIDOR", Priority::High),
    ("HIDROMETRO", Priority::High),
    ("HIDROMETRO_AREA_COMUM", Priority::High),
    ("HIDROMETRO_SHOPPING", Priority::High),
    ("TERMOSTATO", Priority::Low),
];

/// System-wide fallback when nothing else matches.
pub fn global_fallback_priority() -> Priority {
    Priority::Medium
}

/// Static classification of a device profile, case-insensitive.
pub fn get_device_profile_default_priority(profile: &str) -> Priority {
    let profile = profile.trim().to_ascii_uppercase();

    if CRITICAL_PROFILES.contains(&profile.as_str()) {
        Priority::Critical
    } else if profile == "3F_MEDIDOR" || profile.starts_with("HIDROMETRO") {
        Priority::High
    } else if profile.starts_with("TERMOSTATO") {
        Priority::Low
    } else {
        global_fallback_priority()
    }
}

fn default_config_value() -> Value {
    let profiles: serde_json::Map<String, Value> = DEFAULT_PROFILE_TABLE
        .iter()
        .map(|(name, priority)| (name.to_string(), json!(priority.as_u8())))
        .collect();

    json!({
        "enabled": true,
        "priorityRules": {
            "deviceProfiles": profiles,
            "deviceOverrides": {},
            "globalDefault": Priority::Medium.as_u8(),
        },
        "rateControl": {
            "batchSize": 5,
            "delayBetweenBatchesSeconds": 60,
            "maxRetries": 3,
            "retryBackoff": "exponential",
            "retryBaseDelaySeconds": 10,
        },
    })
}

/// Recursively merge `overrides` into `base`. Objects merge key by key,
/// anything else replaces the base value.
pub(crate) fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

/// Build a structurally valid customer configuration, deep-merging
/// `overrides` over the built-in defaults.
pub fn build_default_customer_config(
    overrides: Option<&Value>,
) -> Result<CustomerPriorityConfig, PriorityError> {
    let mut value = default_config_value();
    if let Some(overrides) = overrides {
        deep_merge(&mut value, overrides);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::types::RetryBackoff;

    #[test]
    fn test_profile_classification() {
        assert_eq!(get_device_profile_default_priority("ENTRADA"), Priority::Critical);
        assert_eq!(get_device_profile_default_priority("subestacao"), Priority::Critical);
        assert_eq!(get_device_profile_default_priority("3F_MEDIDOR"), Priority::High);
        assert_eq!(
            get_device_profile_default_priority("Hidrometro_Area_Comum"),
            Priority::High
        );
        assert_eq!(get_device_profile_default_priority("TERMOSTATO"), Priority::Low);
        assert_eq!(get_device_profile_default_priority("ELEVADOR"), Priority::Medium);
        assert_eq!(get_device_profile_default_priority(""), Priority::Medium);
    }

    #[test]
    fn test_profile_classification_is_case_insensitive() {
        for profile in ["Relogio", "3f_medidor", "termostato_external", "unknown", "Trafo"] {
            let base = get_device_profile_default_priority(profile);
            assert_eq!(base, get_device_profile_default_priority(&profile.to_uppercase()));
            assert_eq!(base, get_device_profile_default_priority(&profile.to_lowercase()));
            assert_eq!(base, get_device_profile_default_priority(profile));
        }
    }

    #[test]
    fn test_default_config_values() {
        let config = build_default_customer_config(None).unwrap();

        assert!(config.enabled);
        assert_eq!(config.rate_control.batch_size, 5);
        assert_eq!(config.rate_control.delay_between_batches_seconds, 60);
        assert_eq!(config.rate_control.max_retries, 3);
        assert_eq!(config.rate_control.retry_backoff, RetryBackoff::Exponential);
        assert_eq!(config.priority_rules.customer_default(), Some(Priority::Medium));
        assert!(config.priority_rules.device_overrides.is_empty());
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_default_profiles_mirror_classification() {
        let config = build_default_customer_config(None).unwrap();

        for (profile, value) in &config.priority_rules.device_profiles {
            let priority = Priority::try_from(*value).unwrap();
            assert_eq!(priority, get_device_profile_default_priority(profile), "{}", profile);
        }
    }

    #[test]
    fn test_overrides_deep_merge() {
        let overrides = json!({
            "rateControl": {"batchSize": 10, "retryBackoff": "linear"},
            "priorityRules": {"deviceOverrides": {"device-9": 1}},
        });
        let config = build_default_customer_config(Some(&overrides)).unwrap();

        assert_eq!(config.rate_control.batch_size, 10);
        assert_eq!(config.rate_control.retry_backoff, RetryBackoff::Linear);
        // untouched siblings survive the merge
        assert_eq!(config.rate_control.delay_between_batches_seconds, 60);
        assert_eq!(config.priority_rules.device_override("device-9"), Some(Priority::Critical));
        assert_eq!(config.priority_rules.profile_rule("TRAFO"), Some(Priority::Critical));
    }

    #[test]
    fn test_overrides_with_bad_types_fail() {
        let overrides = json!({"rateControl": {"retryBackoff": "random"}});
        let result = build_default_customer_config(Some(&overrides));
        assert!(matches!(result, Err(PriorityError::InvalidConfig(_))));
    }
}
