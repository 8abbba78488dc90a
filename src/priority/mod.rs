//! Priority resolution for inbound alerts.
//!
//! Every alert gets a [`Priority`] from 1 (critical) to 4 (low). The
//! resolver consults the customer's configuration, fetched from the host
//! platform's attribute store and cached per customer, then falls back to
//! a static device-profile table and finally to [`Priority::Medium`].

mod cache;
mod defaults;
mod error;
mod resolver;
mod types;
mod validation;

pub use cache::{CacheStats, PriorityConfigCache, DEFAULT_CACHE_TTL};
pub use defaults::{
    build_default_customer_config, get_device_profile_default_priority, global_fallback_priority,
};
pub use error::PriorityError;
pub use resolver::{resolve_from_config, PriorityResolver, PrioritySource, ResolvedPriority};
pub use types::{
    CustomerPriorityConfig, InvalidPriority, InvalidRetryBackoff, Priority, PriorityRules,
    RateControl, RetryBackoff, TelegramTarget,
};
pub use validation::{parse_customer_config, validate_customer_config, ValidationReport};
