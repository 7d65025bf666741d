//! Sentiment stream client application.
//!
//! Wires the resilient stream client to logging and metrics:
//! - Loads `AppConfig` from TOML
//! - Connects over WebSocket and optionally starts the server simulation
//! - Logs accepted events, status changes and control acks
//! - Publishes client counters as Prometheus series

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, StatsPublisher};
pub use config::{AppConfig, LogFormat, LoggingConfig};
pub use error::{AppError, AppResult};
