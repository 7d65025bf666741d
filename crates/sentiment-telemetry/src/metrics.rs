//! Prometheus metrics for the sentiment stream.
//!
//! Series cover:
//! - Connection and network state
//! - Reconnect attempts and heartbeat timeouts
//! - Events by validation outcome, presumed-lost events
//! - Pending-cache depth and overflow drops
//! - Accuracy and delay estimates
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a startup bug; it can only happen during static
//! initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, IntCounter, IntGauge, TextEncoder,
};
use sentiment_core::{ClientStatus, ConnectionState, NetworkStatus};

use crate::error::TelemetryResult;

/// Connection state (1 = active state, 0 otherwise).
/// Labels: state (disconnected/connecting/open/closing)
pub static CONNECTION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentiment_connection_state",
        "Stream connection state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Network status (1 = active status, 0 otherwise).
pub static NETWORK_STATUS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentiment_network_status",
        "Observed network status (1=active, 0=inactive)",
        &["status"]
    )
    .unwrap()
});

pub static RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentiment_reconnect_total",
        "Total reconnection attempts scheduled"
    )
    .unwrap()
});

pub static RECONNECT_EXHAUSTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sentiment_reconnect_exhausted",
        "Reconnection gave up (1) or is still allowed (0)"
    )
    .unwrap()
});

pub static HEARTBEAT_TIMEOUT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentiment_heartbeat_timeout_total",
        "Heartbeat probes that went unanswered"
    )
    .unwrap()
});

/// Validated events by outcome.
/// Labels: outcome (accepted/duplicate/stale/missing_fields/out_of_order)
pub static EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentiment_events_total",
        "Validated events by outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static EVENTS_LOST_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentiment_events_lost_total",
        "Events presumed lost from sequence gaps"
    )
    .unwrap()
});

pub static MALFORMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentiment_malformed_messages_total",
        "Inbound frames dropped as malformed"
    )
    .unwrap()
});

pub static CACHE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sentiment_cache_depth", "Events waiting in the send cache").unwrap()
});

pub static CACHE_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sentiment_cache_dropped_total",
        "Cached events evicted on overflow"
    )
    .unwrap()
});

pub static DATA_ACCURACY: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sentiment_data_accuracy",
        "Estimated data accuracy percentage"
    )
    .unwrap()
});

pub static REALTIME_DELAY_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sentiment_realtime_delay_ms",
        "Estimated real-time delay in milliseconds"
    )
    .unwrap()
});

/// Event validation outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Accepted,
    Duplicate,
    Stale,
    MissingFields,
    OutOfOrder,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
            Self::MissingFields => "missing_fields",
            Self::OutOfOrder => "out_of_order",
        }
    }
}

const CONNECTION_STATES: [ConnectionState; 4] = [
    ConnectionState::Disconnected,
    ConnectionState::Connecting,
    ConnectionState::Open,
    ConnectionState::Closing,
];

const NETWORK_STATUSES: [NetworkStatus; 3] = [
    NetworkStatus::Online,
    NetworkStatus::Weak,
    NetworkStatus::Offline,
];

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the active connection state; all others go to 0.
    pub fn connection_state(state: ConnectionState) {
        for s in CONNECTION_STATES {
            CONNECTION_STATE
                .with_label_values(&[s.as_str()])
                .set(if s == state { 1.0 } else { 0.0 });
        }
    }

    /// Set the active network status; all others go to 0.
    pub fn network_status(status: NetworkStatus) {
        for s in NETWORK_STATUSES {
            NETWORK_STATUS
                .with_label_values(&[s.as_str()])
                .set(if s == status { 1.0 } else { 0.0 });
        }
    }

    /// Publish a full status snapshot.
    pub fn status(status: &ClientStatus) {
        Self::connection_state(status.connection_state);
        Self::network_status(status.network_status);
        let quality = status.metrics();
        DATA_ACCURACY.set(quality.data_accuracy);
        REALTIME_DELAY_MS.set(quality.real_time_delay_ms);
        RECONNECT_EXHAUSTED.set(i64::from(status.reconnect_exhausted));
    }

    pub fn reconnects(n: u64) {
        RECONNECT_TOTAL.inc_by(n);
    }

    pub fn heartbeat_timeouts(n: u64) {
        HEARTBEAT_TIMEOUT_TOTAL.inc_by(n);
    }

    /// Count `n` events with the given outcome.
    pub fn events(outcome: EventOutcome, n: u64) {
        if n > 0 {
            EVENTS_TOTAL
                .with_label_values(&[outcome.as_str()])
                .inc_by(n as f64);
        }
    }

    pub fn events_lost(n: u64) {
        EVENTS_LOST_TOTAL.inc_by(n);
    }

    pub fn malformed(n: u64) {
        MALFORMED_TOTAL.inc_by(n);
    }

    pub fn cache_depth(depth: usize) {
        CACHE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    pub fn cache_dropped(n: u64) {
        CACHE_DROPPED_TOTAL.inc_by(n);
    }

    /// Render every registered series in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_counters_accumulate() {
        let before = EVENTS_TOTAL.with_label_values(&["duplicate"]).get();
        Metrics::events(EventOutcome::Duplicate, 2);
        Metrics::events(EventOutcome::Duplicate, 0);
        Metrics::events(EventOutcome::Duplicate, 1);
        assert_eq!(
            EVENTS_TOTAL.with_label_values(&["duplicate"]).get(),
            before + 3.0
        );
    }

    #[test]
    fn test_status_snapshot_is_one_hot_and_renders() {
        Metrics::status(&ClientStatus {
            connection_state: ConnectionState::Open,
            network_status: NetworkStatus::Weak,
            accuracy: 97.5,
            delay_ms: 400.0,
            retry_count: 0,
            reconnect_exhausted: false,
        });
        assert_eq!(DATA_ACCURACY.get(), 97.5);
        assert_eq!(NETWORK_STATUS.with_label_values(&["weak"]).get(), 1.0);

        assert_eq!(CONNECTION_STATE.with_label_values(&["open"]).get(), 1.0);
        assert_eq!(
            CONNECTION_STATE.with_label_values(&["disconnected"]).get(),
            0.0
        );

        Metrics::connection_state(ConnectionState::Disconnected);
        assert_eq!(CONNECTION_STATE.with_label_values(&["open"]).get(), 0.0);

        let text = Metrics::render().unwrap();
        assert!(text.contains("sentiment_data_accuracy 97.5"));
        assert!(text.contains("sentiment_network_status"));
    }
}
