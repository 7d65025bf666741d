//! Error types for sentiment-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown sentiment: {0}")]
    UnknownSentiment(String),

    #[error("Unknown network status: {0}")]
    UnknownNetworkStatus(String),

    #[error("Invalid metrics: {0}")]
    InvalidMetrics(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
