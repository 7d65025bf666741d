//! Prometheus metrics and structured logging for the sentiment stream.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus series for connection state, event outcomes and quality

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with};
pub use metrics::{EventOutcome, Metrics};
