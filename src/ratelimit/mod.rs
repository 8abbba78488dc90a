//! Per-customer dispatch pacing and retry backoff.
//!
//! Each customer's `RateControl` sets the minimum gap between batches and
//! the retry delay strategy. Dispatch history lives in the queue storage.

mod backoff;
mod limiter;

pub use backoff::calculate_retry_delay;
pub use limiter::{
    get_next_retry_time, get_next_retry_time_at, should_retry_now, should_retry_now_at,
    BatchRateLimiter, RateLimitStats,
};
