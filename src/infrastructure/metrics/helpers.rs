//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    PRIORITY_CACHE_HITS_TOTAL, PRIORITY_CACHE_MISSES_TOTAL, PRIORITY_FETCH_ERRORS_TOTAL,
    PRIORITY_RESOLVED_TOTAL, QUEUE_DEQUEUED_TOTAL, QUEUE_ENQUEUED_TOTAL,
    QUEUE_STATUS_UPDATES_TOTAL, RATELIMIT_DENIED_TOTAL, RATELIMIT_DISPATCHES_TOTAL,
    RATELIMIT_STORAGE_ERRORS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn record_enqueued() {
        QUEUE_ENQUEUED_TOTAL.inc();
    }

    /// Record entries handed out by one dequeue call
    pub fn record_dequeued(pending: usize, retry: usize) {
        if pending > 0 {
            QUEUE_DEQUEUED_TOTAL
                .with_label_values(&["PENDING"])
                .inc_by(pending as u64);
        }
        if retry > 0 {
            QUEUE_DEQUEUED_TOTAL
                .with_label_values(&["RETRY"])
                .inc_by(retry as u64);
        }
    }

    pub fn record_status_update(status: &str) {
        QUEUE_STATUS_UPDATES_TOTAL.with_label_values(&[status]).inc();
    }
}

/// Helper struct for recording priority resolution metrics
pub struct PriorityMetrics;

impl PriorityMetrics {
    pub fn record_resolved(source: &str) {
        PRIORITY_RESOLVED_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn record_cache_hit() {
        PRIORITY_CACHE_HITS_TOTAL.inc();
    }

    pub fn record_cache_miss() {
        PRIORITY_CACHE_MISSES_TOTAL.inc();
    }

    pub fn record_fetch_error() {
        PRIORITY_FETCH_ERRORS_TOTAL.inc();
    }
}

/// Helper struct for recording rate limit metrics
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    pub fn record_denied() {
        RATELIMIT_DENIED_TOTAL.inc();
    }

    pub fn record_dispatch() {
        RATELIMIT_DISPATCHES_TOTAL.inc();
    }

    /// Record a storage fault absorbed by the limiter
    pub fn record_storage_error(operation: &str) {
        RATELIMIT_STORAGE_ERRORS_TOTAL
            .with_label_values(&[operation])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_includes_queue_counters() {
        QueueMetrics::record_enqueued();
        QueueMetrics::record_dequeued(2, 1);
        RateLimitMetrics::record_denied();

        let output = encode_metrics().unwrap();
        assert!(output.contains("telegram_queue_enqueued_total"));
        assert!(output.contains("telegram_queue_dequeued_total"));
        assert!(output.contains("telegram_queue_ratelimit_denied_total"));
    }
}
