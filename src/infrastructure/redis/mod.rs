//! Redis connectivity
//!
//! - `pool`: shared multiplexed connection used by the Redis queue storage

pub mod pool;

pub use pool::{PoolError, RedisPool};
