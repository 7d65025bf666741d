//! Main application orchestration.
//!
//! Runs one `StreamClient` until Ctrl-C:
//! - Status changes are logged and published as metrics
//! - Accepted events and control acks are logged
//! - Client counters are published periodically as Prometheus deltas

use crate::config::AppConfig;
use crate::error::AppResult;
use sentiment_core::{ClientStatus, ConnectionState};
use sentiment_telemetry::{EventOutcome, Metrics};
use sentiment_ws::{ClientStats, StreamClient};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Publishes `ClientStats` snapshots as counter increments.
#[derive(Debug, Default)]
pub struct StatsPublisher {
    last: ClientStats,
}

impl StatsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the change since the previous snapshot and return it.
    pub fn publish(&mut self, current: ClientStats) -> ClientStats {
        let prev = self.last;
        let delta = ClientStats {
            validated: current.validated.saturating_sub(prev.validated),
            accepted: current.accepted.saturating_sub(prev.accepted),
            duplicates: current.duplicates.saturating_sub(prev.duplicates),
            stale: current.stale.saturating_sub(prev.stale),
            missing_fields: current.missing_fields.saturating_sub(prev.missing_fields),
            out_of_order: current.out_of_order.saturating_sub(prev.out_of_order),
            lost: current.lost.saturating_sub(prev.lost),
            malformed: current.malformed.saturating_sub(prev.malformed),
            replayed: current.replayed.saturating_sub(prev.replayed),
            transmitted: current.transmitted.saturating_sub(prev.transmitted),
            cache_dropped: current.cache_dropped.saturating_sub(prev.cache_dropped),
            reconnect_attempts: current
                .reconnect_attempts
                .saturating_sub(prev.reconnect_attempts),
            heartbeat_timeouts: current
                .heartbeat_timeouts
                .saturating_sub(prev.heartbeat_timeouts),
        };

        Metrics::events(EventOutcome::Accepted, delta.accepted);
        Metrics::events(EventOutcome::Duplicate, delta.duplicates);
        Metrics::events(EventOutcome::Stale, delta.stale);
        Metrics::events(EventOutcome::MissingFields, delta.missing_fields);
        Metrics::events(EventOutcome::OutOfOrder, delta.out_of_order);
        Metrics::events_lost(delta.lost);
        Metrics::malformed(delta.malformed);
        Metrics::cache_dropped(delta.cache_dropped);
        Metrics::reconnects(delta.reconnect_attempts);
        Metrics::heartbeat_timeouts(delta.heartbeat_timeouts);

        self.last = current;
        delta
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    client: StreamClient,
    stats: StatsPublisher,
}

impl Application {
    /// Create the application. Must be called from within a Tokio runtime.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = StreamClient::with_websocket(config.client.clone())?;
        Ok(Self {
            config,
            client,
            stats: StatsPublisher::new(),
        })
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    /// Connect and run until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<ClientStatus>();
        self.register_handlers(status_tx);

        info!(url = %self.config.client.url, "Starting stream client");
        self.client.connect_default();

        let stats_period = Duration::from_millis(self.config.stats_interval_ms.max(1));
        let mut stats_interval = tokio::time::interval(stats_period);
        let mut last_state = ConnectionState::Disconnected;

        loop {
            tokio::select! {
                Some(status) = status_rx.recv() => {
                    self.on_status(&status, last_state);
                    last_state = status.connection_state;
                }

                _ = stats_interval.tick(), if self.config.stats_interval_ms > 0 => {
                    self.publish_stats();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn register_handlers(&self, status_tx: mpsc::UnboundedSender<ClientStatus>) {
        self.client.on_event(|event| {
            info!(
                id = %event.id,
                seq = event.sequence_number,
                sentiment = %event.sentiment,
                source = %event.source,
                title = %event.title,
                "Event"
            );
        });

        self.client.on_status_change(move |status| {
            let _ = status_tx.send(*status);
        });

        self.client.on_control(|ctrl| {
            info!(command = ?ctrl.command, message = %ctrl.message, "Control ack");
        });
    }

    fn on_status(&self, status: &ClientStatus, previous: ConnectionState) {
        Metrics::status(status);
        Metrics::cache_depth(self.client.cache_len());

        if status.connection_state != previous {
            info!(
                state = %status.connection_state,
                network = %status.network_status,
                retry_count = status.retry_count,
                "Connection state changed"
            );
        } else {
            debug!(
                network = %status.network_status,
                accuracy = status.accuracy,
                delay_ms = status.delay_ms,
                "Quality update"
            );
        }

        if status.reconnect_exhausted {
            warn!("Reconnection exhausted; restart to try again");
        }

        if self.config.start_simulation
            && status.connection_state == ConnectionState::Open
            && previous != ConnectionState::Open
            && self.client.start_simulation()
        {
            info!("Requested simulation start");
        }
    }

    fn publish_stats(&mut self) {
        let delta = self.stats.publish(self.client.stats());
        Metrics::cache_depth(self.client.cache_len());
        if delta.validated > 0 || delta.malformed > 0 {
            debug!(
                validated = delta.validated,
                accepted = delta.accepted,
                lost = delta.lost,
                malformed = delta.malformed,
                "Stream counters"
            );
        }
    }

    fn shutdown(&mut self) {
        if self.client.stop_simulation() {
            info!("Requested simulation stop");
        }
        self.client.disconnect();
        self.publish_stats();

        let stats = self.client.stats();
        info!(
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            stale = stats.stale,
            lost = stats.lost,
            cached = self.client.cache_len(),
            "Shutting down"
        );

        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(?e, "Failed to render metrics"),
        }
    }
}
