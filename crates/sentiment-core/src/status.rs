//! Connection and quality status types.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport lifecycle state of a stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed network link quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Weak,
    #[default]
    Offline,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Weak => "weak",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(Self::Online),
            "weak" => Ok(Self::Weak),
            "offline" => Ok(Self::Offline),
            other => Err(CoreError::UnknownNetworkStatus(other.to_string())),
        }
    }
}

/// Data quality estimate.
///
/// `data_accuracy` is a percentage in `[0, 100]`, `real_time_delay_ms` is
/// never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub data_accuracy: f64,
    pub real_time_delay_ms: f64,
}

impl QualityMetrics {
    pub const MIN_ACCURACY: f64 = 0.0;
    pub const MAX_ACCURACY: f64 = 100.0;

    /// Create metrics, rejecting values outside the valid ranges.
    pub fn new(data_accuracy: f64, real_time_delay_ms: f64) -> Result<Self> {
        if !(Self::MIN_ACCURACY..=Self::MAX_ACCURACY).contains(&data_accuracy) {
            return Err(CoreError::InvalidMetrics(format!(
                "accuracy {data_accuracy} outside [0, 100]"
            )));
        }
        if !(real_time_delay_ms >= 0.0 && real_time_delay_ms.is_finite()) {
            return Err(CoreError::InvalidMetrics(format!(
                "delay {real_time_delay_ms} must be a non-negative number"
            )));
        }
        Ok(Self {
            data_accuracy,
            real_time_delay_ms,
        })
    }

    /// Apply a signed accuracy change, clamped to `[0, 100]`.
    pub fn with_accuracy_delta(self, delta: f64) -> Self {
        let data_accuracy =
            (self.data_accuracy + delta).clamp(Self::MIN_ACCURACY, Self::MAX_ACCURACY);
        Self {
            data_accuracy,
            ..self
        }
    }
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            data_accuracy: Self::MAX_ACCURACY,
            real_time_delay_ms: 0.0,
        }
    }
}

/// Snapshot published to status observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub connection_state: ConnectionState,
    pub network_status: NetworkStatus,
    pub accuracy: f64,
    pub delay_ms: f64,
    pub retry_count: u32,
    /// Reconnection gave up; no further automatic attempts will be made.
    pub reconnect_exhausted: bool,
}

impl ClientStatus {
    pub fn metrics(&self) -> QualityMetrics {
        QualityMetrics {
            data_accuracy: self.accuracy,
            real_time_delay_ms: self.delay_ms,
        }
    }
}
