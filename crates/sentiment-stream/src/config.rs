//! Application configuration.

use crate::error::{AppError, AppResult};
use sentiment_telemetry::logging::DEFAULT_FILTER;
use sentiment_ws::StreamClientConfig;
use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON when `RUST_ENV=production`, pretty otherwise.
    #[default]
    Auto,
    Json,
    Pretty,
}

impl LogFormat {
    /// `Some(true)` for JSON, `Some(false)` for pretty, `None` to decide from the environment.
    pub fn as_json_flag(&self) -> Option<bool> {
        match self {
            Self::Auto => None,
            Self::Json => Some(true),
            Self::Pretty => Some(false),
        }
    }
}

/// Logging configuration. `RUST_LOG` overrides `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stream client settings (`[client]` table).
    #[serde(default)]
    pub client: StreamClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Period for publishing client counters as metrics. 0 disables it.
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Send `startSimulation` every time the connection opens.
    #[serde(default)]
    pub start_simulation: bool,
}

fn default_stats_interval_ms() -> u64 {
    10_000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.client.validate()?;
        Ok(config)
    }
}
