//! Structural validation of customer configuration documents.

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::{CustomerPriorityConfig, Priority, RetryBackoff};

/// Outcome of [`validate_customer_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Numeric `rateControl` fields and the largest value each one can hold
const RATE_CONTROL_NUMBERS: &[(&str, u64)] = &[
    ("batchSize", u32::MAX as u64),
    ("delayBetweenBatchesSeconds", u64::MAX),
    ("maxRetries", u32::MAX as u64),
    ("retryBaseDelaySeconds", u64::MAX),
];

fn is_priority(value: &Value) -> bool {
    value
        .as_i64()
        .map(|v| Priority::try_from(v).is_ok())
        .unwrap_or(false)
}

/// Positive whole number no larger than `max`. Fractions are rejected
/// because `RateControl` stores integers.
fn is_positive_integer(value: &Value, max: u64) -> bool {
    value.as_u64().is_some_and(|v| v > 0 && v <= max)
}

fn check_rule_map(rules: &Map<String, Value>, field: &str, errors: &mut Vec<String>) {
    match rules.get(field) {
        None => {}
        Some(Value::Object(map)) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if !is_priority(&map[key]) {
                    errors.push(format!(
                        "priorityRules.{}.{} must be a priority between 1 and 4",
                        field, key
                    ));
                }
            }
        }
        Some(_) => errors.push(format!("priorityRules.{} must be an object", field)),
    }
}

fn check_priority_rules(root: &Map<String, Value>, errors: &mut Vec<String>) {
    match root.get("priorityRules") {
        None => errors.push("priorityRules is required".to_string()),
        Some(Value::Object(rules)) => {
            check_rule_map(rules, "deviceProfiles", errors);
            check_rule_map(rules, "deviceOverrides", errors);
            if let Some(default) = rules.get("globalDefault") {
                if !is_priority(default) {
                    errors.push(
                        "priorityRules.globalDefault must be a priority between 1 and 4"
                            .to_string(),
                    );
                }
            }
        }
        Some(_) => errors.push("priorityRules must be an object".to_string()),
    }
}

fn check_rate_control(root: &Map<String, Value>, errors: &mut Vec<String>) {
    let rate_control = match root.get("rateControl") {
        None => {
            errors.push("rateControl is required".to_string());
            return;
        }
        Some(Value::Object(rc)) => rc,
        Some(_) => {
            errors.push("rateControl must be an object".to_string());
            return;
        }
    };

    for (field, max) in RATE_CONTROL_NUMBERS {
        let ok = rate_control
            .get(*field)
            .is_some_and(|v| is_positive_integer(v, *max));
        if !ok {
            errors.push(format!("rateControl.{} must be a positive number", field));
        }
    }

    let backoff_ok = rate_control
        .get("retryBackoff")
        .and_then(Value::as_str)
        .map(|s| s.parse::<RetryBackoff>().is_ok())
        .unwrap_or(false);
    if !backoff_ok {
        errors.push("rateControl.retryBackoff must be 'exponential' or 'linear'".to_string());
    }
}

fn check_telegram(root: &Map<String, Value>, errors: &mut Vec<String>) {
    let telegram = match root.get("telegram") {
        Some(Value::Object(t)) => t,
        _ => {
            errors.push("telegram configuration is required".to_string());
            return;
        }
    };

    for (field, label) in [("botToken", "telegram.botToken"), ("chatId", "telegram.chatId")] {
        let present = match telegram.get(field) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        };
        if !present {
            errors.push(format!("{} is required", label));
        }
    }
}

/// Validate a customer configuration document, reporting every violation.
pub fn validate_customer_config(config: &Value) -> ValidationReport {
    let root = match config.as_object() {
        Some(root) => root,
        None => {
            return ValidationReport {
                valid: false,
                errors: vec!["configuration must be a JSON object".to_string()],
            }
        }
    };

    let mut errors = Vec::new();

    match root.get("enabled") {
        None => errors.push("enabled is required".to_string()),
        Some(Value::Bool(_)) => {}
        Some(_) => errors.push("enabled must be a boolean".to_string()),
    }

    check_priority_rules(root, &mut errors);
    check_rate_control(root, &mut errors);
    check_telegram(root, &mut errors);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// Parse a fetched configuration, returning `None` unless it is structurally
/// valid: `enabled` boolean, `priorityRules` object and a positive
/// `rateControl` with a known back-off strategy.
pub fn parse_customer_config(value: &Value) -> Option<CustomerPriorityConfig> {
    let root = value.as_object()?;
    if !matches!(root.get("enabled"), Some(Value::Bool(_))) {
        return None;
    }
    if !matches!(root.get("priorityRules"), Some(Value::Object(_))) {
        return None;
    }

    let config: CustomerPriorityConfig = serde_json::from_value(value.clone()).ok()?;
    config.rate_control.is_valid().then_some(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::defaults::build_default_customer_config;
    use serde_json::json;

    fn telegram_block() -> Value {
        json!({"telegram": {"botToken": "123:abc", "chatId": "-100200"}})
    }

    #[test]
    fn test_default_config_with_telegram_is_valid() {
        let config = build_default_customer_config(Some(&telegram_block())).unwrap();
        let report = validate_customer_config(&serde_json::to_value(&config).unwrap());

        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_default_config_without_telegram() {
        let config = build_default_customer_config(None).unwrap();
        let report = validate_customer_config(&serde_json::to_value(&config).unwrap());

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["telegram configuration is required"]);
    }

    #[test]
    fn test_collects_every_error() {
        let report = validate_customer_config(&json!({
            "rateControl": {
                "batchSize": 0,
                "delayBetweenBatchesSeconds": 60,
                "maxRetries": 3,
                "retryBackoff": "sometimes",
                "retryBaseDelaySeconds": -5
            }
        }));

        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "enabled is required",
                "priorityRules is required",
                "rateControl.batchSize must be a positive number",
                "rateControl.retryBaseDelaySeconds must be a positive number",
                "rateControl.retryBackoff must be 'exponential' or 'linear'",
                "telegram configuration is required",
            ]
        );
    }

    #[test]
    fn test_rule_values_checked() {
        let mut config = serde_json::to_value(
            build_default_customer_config(Some(&telegram_block())).unwrap(),
        )
        .unwrap();
        config["enabled"] = json!("yes");
        config["priorityRules"]["deviceOverrides"] = json!({"dev-1": 9});
        config["priorityRules"]["globalDefault"] = json!(0);
        config["telegram"]["chatId"] = json!("");

        let report = validate_customer_config(&config);
        assert_eq!(
            report.errors,
            vec![
                "enabled must be a boolean",
                "priorityRules.deviceOverrides.dev-1 must be a priority between 1 and 4",
                "priorityRules.globalDefault must be a priority between 1 and 4",
                "telegram.chatId is required",
            ]
        );
    }

    #[test]
    fn test_non_object_config() {
        let report = validate_customer_config(&json!([1, 2, 3]));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["configuration must be a JSON object"]);
    }

    #[test]
    fn test_parse_accepts_minimal_config() {
        let config = parse_customer_config(&json!({
            "enabled": true,
            "priorityRules": {"deviceOverrides": {"device-1": 1}}
        }))
        .unwrap();
        assert_eq!(config.priority_rules.device_override("device-1"), Some(Priority::Critical));
    }

    #[test]
    fn test_parse_rejects_structural_problems() {
        assert!(parse_customer_config(&json!({"priorityRules": {}})).is_none());
        assert!(parse_customer_config(&json!({"enabled": "true", "priorityRules": {}})).is_none());
        assert!(parse_customer_config(&json!({"enabled": true, "priorityRules": []})).is_none());
        assert!(parse_customer_config(&json!({
            "enabled": true,
            "priorityRules": {},
            "rateControl": {"retryBackoff": "random"}
        }))
        .is_none());
        assert!(parse_customer_config(&json!({
            "enabled": true,
            "priorityRules": {},
            "rateControl": {"batchSize": 0}
        }))
        .is_none());
    }

    #[test]
    fn test_validation_agrees_with_parsing() {
        let base = json!({
            "enabled": true,
            "priorityRules": {"deviceProfiles": {"TRAFO": 1}, "globalDefault": 3},
            "rateControl": {
                "batchSize": 5,
                "delayBetweenBatchesSeconds": 60,
                "maxRetries": 3,
                "retryBackoff": "linear",
                "retryBaseDelaySeconds": 10
            },
            "telegram": {"botToken": "123:abc", "chatId": "-100200"}
        });

        let mut cases = vec![base.clone()];
        for (field, value) in [
            ("batchSize", json!(2.5)),
            ("delayBetweenBatchesSeconds", json!(0.5)),
            ("maxRetries", json!(1.0e1)),
            ("retryBaseDelaySeconds", json!(-4)),
            ("batchSize", json!(u64::from(u32::MAX) + 1)),
            ("maxRetries", json!("3")),
            ("retryBackoff", json!("random")),
        ] {
            let mut case = base.clone();
            case["rateControl"][field] = value;
            cases.push(case);
        }

        for case in cases {
            let report = validate_customer_config(&case);
            assert_eq!(
                report.valid,
                parse_customer_config(&case).is_some(),
                "{} -> {:?}",
                case["rateControl"],
                report.errors
            );
        }
    }

    #[test]
    fn test_fractional_rate_control_rejected() {
        let mut config = serde_json::to_value(
            build_default_customer_config(Some(&telegram_block())).unwrap(),
        )
        .unwrap();
        config["rateControl"]["batchSize"] = json!(2.5);
        config["rateControl"]["delayBetweenBatchesSeconds"] = json!(0.5);

        let report = validate_customer_config(&config);
        assert_eq!(
            report.errors,
            vec![
                "rateControl.batchSize must be a positive number",
                "rateControl.delayBetweenBatchesSeconds must be a positive number",
            ]
        );
    }
}
