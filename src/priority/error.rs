use thiserror::Error;

/// Errors raised while fetching or building customer priority configuration.
#[derive(Debug, Error)]
pub enum PriorityError {
    /// Transport-level failure talking to the attribute API
    #[error("Attribute API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Attribute API answered with a non-success status other than 404
    #[error("Attribute API returned status {status} for customer {customer_id}")]
    Http { status: u16, customer_id: String },

    /// The attribute API base URL cannot have path segments appended
    #[error("Invalid attribute API base URL: {0}")]
    InvalidUrl(String),

    /// A configuration document could not be (de)serialized
    #[error("Invalid customer configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}
