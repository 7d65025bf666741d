//! Heartbeat monitoring for stream connections.
//!
//! Sends a liveness probe every `interval` and expects an ack within
//! `timeout`. A probe that goes unanswered fires the timeout callback once.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Default ack timeout per probe.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Default)]
struct HeartbeatState {
    last_probe: Option<DateTime<Utc>>,
    last_ack: Option<DateTime<Utc>>,
    awaiting_ack: bool,
    missed_probes: u64,
}

/// Timer pair owned while the monitor is running.
struct Running {
    token: CancellationToken,
    ack_tx: mpsc::UnboundedSender<()>,
}

/// Heartbeat monitor with a probe timer and a per-probe ack deadline.
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    state: Arc<RwLock<HeartbeatState>>,
    running: Option<Running>,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Arc::new(RwLock::new(HeartbeatState::default())),
            running: None,
        }
    }

    /// Start probing.
    ///
    /// Every interval `send_probe` is called; it returns `true` if the
    /// connection was open and the probe went out, which arms the ack
    /// deadline. If the deadline passes without `ack()`, `on_timeout` is
    /// called. Starting while running replaces the previous timers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<P, T>(&mut self, mut send_probe: P, mut on_timeout: T)
    where
        P: FnMut() -> bool + Send + 'static,
        T: FnMut() + Send + 'static,
    {
        self.stop();

        let token = CancellationToken::new();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<()>();
        let child = token.clone();
        let state = self.state.clone();
        let interval = self.interval;
        let timeout = self.timeout;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut deadline: Option<Instant> = None;

            loop {
                let armed = deadline;
                let expiry = async move {
                    match armed {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    biased;
                    () = child.cancelled() => break,
                    Some(()) = ack_rx.recv() => {
                        deadline = None;
                    }
                    () = expiry => {
                        deadline = None;
                        {
                            let mut s = state.write();
                            s.awaiting_ack = false;
                            s.missed_probes += 1;
                        }
                        warn!(timeout_ms = timeout.as_millis() as u64, "Heartbeat ack timed out");
                        on_timeout();
                    }
                    _ = ticker.tick() => {
                        if send_probe() {
                            deadline = Some(Instant::now() + timeout);
                            let mut s = state.write();
                            s.last_probe = Some(Utc::now());
                            s.awaiting_ack = true;
                            debug!("Sent heartbeat probe");
                        }
                    }
                }
            }
        });

        self.running = Some(Running { token, ack_tx });
    }

    /// Cancel both timers. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            debug!("Heartbeat stopped");
        }
        self.state.write().awaiting_ack = false;
    }

    /// Record a heartbeat ack, disarming the pending deadline.
    pub fn ack(&self) -> DateTime<Utc> {
        let now = Utc::now();
        {
            let mut s = self.state.write();
            if let Some(probe) = s.last_probe.filter(|_| s.awaiting_ack) {
                debug!(rtt_ms = (now - probe).num_milliseconds(), "Heartbeat ack");
            }
            s.last_ack = Some(now);
            s.awaiting_ack = false;
        }
        if let Some(running) = &self.running {
            let _ = running.ack_tx.send(());
        }
        now
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        let s = self.state.read();
        HeartbeatStats {
            last_probe: s.last_probe,
            last_ack: s.last_ack,
            awaiting_ack: s.awaiting_ack,
            missed_probes: s.missed_probes,
        }
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS)
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_probe: Option<DateTime<Utc>>,
    pub last_ack: Option<DateTime<Utc>>,
    pub awaiting_ack: bool,
    pub missed_probes: u64,
}
