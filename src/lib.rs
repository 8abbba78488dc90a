// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules at the crate root
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;

// Domain layer
pub mod priority;
pub mod queue;
pub mod ratelimit;

// Supporting modules
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
pub use state::QueueServices;
