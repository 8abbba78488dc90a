//! Retry delay calculation

use crate::priority::RetryBackoff;

/// Base delay used when the configured one is not positive
const FALLBACK_BASE_DELAY_SECONDS: i64 = 10;

/// Delay in milliseconds before retry number `retry_count` may run.
///
/// Negative counts are treated as zero and a non-positive base delay falls
/// back to 10 seconds. Exponential doubles per retry, linear grows by one
/// base delay per retry. Saturates at `u64::MAX`.
pub fn calculate_retry_delay(retry_count: i64, strategy: RetryBackoff, base_delay_seconds: i64) -> u64 {
    let retries = retry_count.max(0) as u64;
    let base_seconds = if base_delay_seconds <= 0 {
        FALLBACK_BASE_DELAY_SECONDS
    } else {
        base_delay_seconds
    } as u64;
    let base_ms = base_seconds.saturating_mul(1000);

    match strategy {
        RetryBackoff::Exponential => {
            let factor = u32::try_from(retries)
                .ok()
                .and_then(|n| 1u64.checked_shl(n))
                .unwrap_or(u64::MAX);
            base_ms.saturating_mul(factor)
        }
        RetryBackoff::Linear => base_ms.saturating_mul(retries.saturating_add(1)),
    }
}
