//! Stream client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Core error: {0}")]
    Core(#[from] sentiment_core::CoreError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
