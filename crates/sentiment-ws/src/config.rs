//! Stream client configuration.

use crate::error::{StreamError, StreamResult};
use crate::heartbeat::{DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS};
use crate::reconnect::{
    Backoff, ReconnectPolicy, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY_MS,
    DEFAULT_RETRY_DELAY_MS,
};
use crate::validator::DEFAULT_STALE_AFTER_MS;
use sentiment_core::QualityMetrics;
use serde::{Deserialize, Serialize};

/// Stream client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamClientConfig {
    /// WebSocket URL used by `StreamClient::connect_default`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Heartbeat probe interval.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat ack must arrive within this.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before a reconnect attempt (base delay for exponential).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: Backoff,
    /// Upper bound for exponential backoff.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Pending-event cache capacity; overflow drops the oldest.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Background cache drain period while open.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Events per background drain.
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,
    /// Events drained opportunistically after a live send.
    #[serde(default = "default_send_drain_batch")]
    pub send_drain_batch: usize,
    /// Freshness window for event timestamps.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: i64,
    /// Sequence numbers remembered below the expected one.
    #[serde(default = "default_seen_window")]
    pub seen_window: u64,
    /// Event ids remembered for at-most-once forwarding.
    #[serde(default = "default_processed_id_capacity")]
    pub processed_id_capacity: usize,
    /// Starting data accuracy percentage.
    #[serde(default = "default_initial_accuracy")]
    pub initial_accuracy: f64,
}

fn default_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_timeout_ms() -> u64 {
    DEFAULT_HEARTBEAT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_retry_delay_ms() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_MS
}

fn default_cache_capacity() -> usize {
    1_000
}

fn default_drain_interval_ms() -> u64 {
    1_000
}

fn default_drain_batch_size() -> usize {
    10
}

fn default_send_drain_batch() -> usize {
    5
}

fn default_stale_after_ms() -> i64 {
    DEFAULT_STALE_AFTER_MS
}

fn default_seen_window() -> u64 {
    10_000
}

fn default_processed_id_capacity() -> usize {
    4_096
}

fn default_initial_accuracy() -> f64 {
    QualityMetrics::MAX_ACCURACY
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: Backoff::default(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            cache_capacity: default_cache_capacity(),
            drain_interval_ms: default_drain_interval_ms(),
            drain_batch_size: default_drain_batch_size(),
            send_drain_batch: default_send_drain_batch(),
            stale_after_ms: default_stale_after_ms(),
            seen_window: default_seen_window(),
            processed_id_capacity: default_processed_id_capacity(),
            initial_accuracy: default_initial_accuracy(),
        }
    }
}

impl StreamClientConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &str) -> StreamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StreamError::InvalidConfig(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> StreamResult<()> {
        let non_zero = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("drain_interval_ms", self.drain_interval_ms),
            ("cache_capacity", self.cache_capacity as u64),
            ("drain_batch_size", self.drain_batch_size as u64),
            ("processed_id_capacity", self.processed_id_capacity as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(StreamError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        // A timeout at or past the next probe is re-armed before it can fire.
        if self.heartbeat_timeout_ms >= self.heartbeat_interval_ms {
            return Err(StreamError::InvalidConfig(format!(
                "heartbeat_timeout_ms ({}) must be less than heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        if self.stale_after_ms <= 0 {
            return Err(StreamError::InvalidConfig(
                "stale_after_ms must be positive".to_string(),
            ));
        }

        QualityMetrics::new(self.initial_accuracy, 0.0)?;
        Ok(())
    }

    /// Build the reconnect policy described by this config.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.backoff {
            Backoff::Fixed => ReconnectPolicy::new(self.max_retries, self.retry_delay_ms),
            Backoff::Exponential => ReconnectPolicy::exponential(
                self.max_retries,
                self.retry_delay_ms,
                self.max_retry_delay_ms,
            ),
        }
    }
}
