//! Prometheus metrics for the alert queue.
//!
//! - Queue metrics (enqueued, dequeued, status transitions)
//! - Priority resolution metrics (by rule source, config cache behaviour)
//! - Rate limiting metrics (denied batches, storage faults)

mod helpers;

pub use helpers::{encode_metrics, PriorityMetrics, QueueMetrics, RateLimitMetrics};

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "telegram_queue";

lazy_static! {
    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Entries persisted by enqueue
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_enqueued_total", METRIC_PREFIX),
        "Total queue entries enqueued"
    ).unwrap();

    /// Entries handed out by dequeue, by the status they were fetched in
    pub static ref QUEUE_DEQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dequeued_total", METRIC_PREFIX),
        "Total queue entries dequeued",
        &["status"]
    ).unwrap();

    /// Status transitions written through update_status
    pub static ref QUEUE_STATUS_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_status_updates_total", METRIC_PREFIX),
        "Total queue entry status updates",
        &["status"]
    ).unwrap();

    // ============================================================================
    // Priority Metrics
    // ============================================================================

    /// Resolved priorities by the rule that produced them
    pub static ref PRIORITY_RESOLVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_priority_resolved_total", METRIC_PREFIX),
        "Total priority resolutions by source",
        &["source"]
    ).unwrap();

    /// Customer config served from cache
    pub static ref PRIORITY_CACHE_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_priority_cache_hits_total", METRIC_PREFIX),
        "Customer priority config cache hits"
    ).unwrap();

    /// Customer config fetched from the attribute API
    pub static ref PRIORITY_CACHE_MISSES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_priority_cache_misses_total", METRIC_PREFIX),
        "Customer priority config cache misses"
    ).unwrap();

    /// Attribute API failures swallowed during resolution
    pub static ref PRIORITY_FETCH_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_priority_fetch_errors_total", METRIC_PREFIX),
        "Customer priority config fetch errors"
    ).unwrap();

    // ============================================================================
    // Rate Limiting Metrics
    // ============================================================================

    /// Batches held back by the per-customer delay
    pub static ref RATELIMIT_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_denied_total", METRIC_PREFIX),
        "Total batches denied by rate limiting"
    ).unwrap();

    /// Batches recorded as dispatched
    pub static ref RATELIMIT_DISPATCHES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_dispatches_total", METRIC_PREFIX),
        "Total batch dispatches recorded"
    ).unwrap();

    /// Storage faults absorbed by the rate limiter
    pub static ref RATELIMIT_STORAGE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ratelimit_storage_errors_total", METRIC_PREFIX),
        "Rate limit state storage errors",
        &["operation"]
    ).unwrap();
}
