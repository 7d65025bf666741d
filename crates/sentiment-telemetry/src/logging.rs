//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a configured filter is set.
pub const DEFAULT_FILTER: &str = "info,sentiment=debug";

/// Initialize structured logging with defaults.
///
/// JSON output when `RUST_ENV=production`, pretty output otherwise.
pub fn init_logging() -> TelemetryResult<()> {
    init_logging_with(None, None)
}

/// Initialize structured logging.
///
/// `RUST_LOG` wins over `filter`. `json` forces the output format; `None`
/// decides from `RUST_ENV`. Fails if a global subscriber is already set.
pub fn init_logging_with(filter: Option<&str>, json: Option<bool>) -> TelemetryResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(filter.unwrap_or(DEFAULT_FILTER))
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?,
    };

    let json = json.unwrap_or_else(is_production);

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

fn is_production() -> bool {
    std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false)
}
