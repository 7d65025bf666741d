//! Resilient stream client.
//!
//! `StreamClient` owns the single transport connection and drives the
//! lifecycle `Disconnected -> Connecting -> Open -> (Closing) -> Disconnected`.
//! Transport events and timer firings are funnelled through one channel and
//! handled in arrival order by a pump task. Client state sits behind one
//! mutex; observers are called after it is released so they may call back
//! into the client.
//!
//! # Sending
//!
//! | link state          | action                                        |
//! |---------------------|-----------------------------------------------|
//! | open + online       | transmit, then drain up to `send_drain_batch` |
//! | open + weak         | transmit and keep a copy in the cache         |
//! | offline or not open | cache only                                    |
//!
//! Transmitted events are echoed locally through the same
//! validate-and-forward path as inbound data. A weakly-sent event can go out
//! twice (live and drained copy) but is forwarded at most once.

use crate::cache::StreamCache;
use crate::config::StreamClientConfig;
use crate::error::StreamResult;
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{ControlCommand, ControlMessage, WireMessage};
use crate::quality;
use crate::reconnect::ReconnectPolicy;
use crate::timer::TimerHandle;
use crate::transport::{Transport, TransportEvent, TransportEventSink, TransportFactory, WsTransportFactory};
use crate::validator::{Rejection, SequenceTracker, ValidationOutcome};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sentiment_core::{
    ClientStatus, ConnectionState, EventId, NetworkStatus, QualityMetrics, StreamEvent,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Internal events processed by the pump task.
#[derive(Debug)]
pub(crate) enum Signal {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    HeartbeatTimeout {
        generation: u64,
    },
    DrainTick {
        generation: u64,
    },
    Reconnect,
}

/// What `send` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted live; `drained` cached events went out after it.
    Sent { drained: usize },
    /// Transmitted live and a copy kept in the cache (weak link).
    SentAndCached,
    /// Only cached.
    Cached,
}

/// Running counters for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Events that reached the validator.
    pub validated: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub missing_fields: u64,
    pub out_of_order: u64,
    /// Sum of sequence gaps.
    pub lost: u64,
    /// Inbound frames that failed to decode.
    pub malformed: u64,
    /// Events skipped because their id was already processed.
    pub replayed: u64,
    /// Data frames handed to the transport.
    pub transmitted: u64,
    /// Cache entries evicted on overflow.
    pub cache_dropped: u64,
    pub reconnect_attempts: u64,
    pub heartbeat_timeouts: u64,
}

type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(&ClientStatus) + Send + Sync>;
type ControlHandler = Arc<dyn Fn(&ControlMessage) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    event: Vec<EventHandler>,
    status: Vec<StatusHandler>,
    control: Vec<ControlHandler>,
}

/// Observer callbacks queued while the state lock is held.
enum Notification {
    Event(StreamEvent),
    Status(ClientStatus),
    Control(ControlMessage),
}

/// Bounded record of processed event ids.
struct ProcessedIds {
    order: VecDeque<EventId>,
    ids: HashSet<EventId>,
    capacity: usize,
}

impl ProcessedIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: EventId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// The current connection.
struct Link {
    transport: Arc<dyn Transport>,
    open: Arc<AtomicBool>,
}

struct Inner {
    config: StreamClientConfig,
    factory: Arc<dyn TransportFactory>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    url: Option<String>,
    state: ConnectionState,
    network_status: NetworkStatus,
    metrics: QualityMetrics,
    last_heartbeat_ack_at: Option<DateTime<Utc>>,
    reconnect_exhausted: bool,
    explicit_disconnect: bool,
    /// Bumped on every open and teardown; stale events are ignored.
    generation: u64,
    link: Option<Link>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectPolicy,
    drain_timer: Option<TimerHandle>,
    cache: StreamCache<StreamEvent>,
    tracker: SequenceTracker,
    processed: ProcessedIds,
    stats: ClientStats,
}

impl Inner {
    fn new(
        config: StreamClientConfig,
        factory: Arc<dyn TransportFactory>,
        signal_tx: mpsc::UnboundedSender<Signal>,
    ) -> StreamResult<Self> {
        let metrics = QualityMetrics::new(config.initial_accuracy, 0.0)?;
        Ok(Self {
            factory,
            signal_tx,
            url: None,
            state: ConnectionState::Disconnected,
            network_status: NetworkStatus::Offline,
            metrics,
            last_heartbeat_ack_at: None,
            reconnect_exhausted: false,
            explicit_disconnect: false,
            generation: 0,
            link: None,
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            reconnect: config.reconnect_policy(),
            drain_timer: None,
            cache: StreamCache::new(config.cache_capacity)?,
            tracker: SequenceTracker::new(config.seen_window, config.stale_after_ms),
            processed: ProcessedIds::new(config.processed_id_capacity),
            stats: ClientStats::default(),
            config,
        })
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            connection_state: self.state,
            network_status: self.network_status,
            accuracy: self.metrics.data_accuracy,
            delay_ms: self.metrics.real_time_delay_ms,
            retry_count: self.reconnect.retry_count(),
            reconnect_exhausted: self.reconnect_exhausted,
        }
    }

    fn push_status(&self, notes: &mut Vec<Notification>) {
        notes.push(Notification::Status(self.status()));
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            cache_dropped: self.cache.dropped(),
            ..self.stats
        }
    }

    fn apply_network_status(&mut self, status: NetworkStatus) {
        self.network_status = status;
        self.metrics = quality::adjust(status, self.metrics);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn open_transport(&mut self, notes: &mut Vec<Notification>) {
        self.teardown_connection();

        let Some(url) = self.url.clone() else {
            warn!("No URL to connect to");
            return;
        };

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        let sink = TransportEventSink::new(self.generation, self.signal_tx.clone());
        let transport: Arc<dyn Transport> = Arc::from(self.factory.open(&url, sink));
        self.link = Some(Link {
            transport,
            open: Arc::new(AtomicBool::new(false)),
        });

        info!(url = %url, generation = self.generation, "Stream connecting");
        self.push_status(notes);
    }

    /// Stop timers and close the current transport, if any.
    fn teardown_connection(&mut self) -> bool {
        self.heartbeat.stop();
        if let Some(timer) = self.drain_timer.take() {
            timer.cancel();
        }
        self.generation += 1;

        match self.link.take() {
            Some(link) => {
                link.open.store(false, Ordering::SeqCst);
                link.transport.close();
                true
            }
            None => false,
        }
    }

    fn on_open(&mut self, notes: &mut Vec<Notification>) {
        let (transport, open) = match &self.link {
            Some(link) => (link.transport.clone(), link.open.clone()),
            None => return,
        };
        open.store(true, Ordering::SeqCst);

        self.state = ConnectionState::Open;
        self.reconnect.reset();
        self.reconnect_exhausted = false;
        self.apply_network_status(NetworkStatus::Online);
        info!(generation = self.generation, cached = self.cache.len(), "Stream open");

        let timeout_tx = self.signal_tx.clone();
        let generation = self.generation;
        self.heartbeat.start(
            move || {
                if !open.load(Ordering::SeqCst) {
                    return false;
                }
                match WireMessage::heartbeat().encode() {
                    Ok(text) => transport.send(text).is_ok(),
                    Err(_) => false,
                }
            },
            move || {
                let _ = timeout_tx.send(Signal::HeartbeatTimeout { generation });
            },
        );

        let drain_tx = self.signal_tx.clone();
        self.drain_timer = Some(TimerHandle::every(
            Duration::from_millis(self.config.drain_interval_ms),
            move || {
                let _ = drain_tx.send(Signal::DrainTick { generation });
            },
        ));

        self.push_status(notes);
    }

    fn on_connection_lost(&mut self, reason: &str, notes: &mut Vec<Notification>) {
        if !self.teardown_connection() {
            return;
        }

        self.state = ConnectionState::Disconnected;
        self.apply_network_status(NetworkStatus::Offline);
        warn!(reason, "Stream connection lost");

        if !self.explicit_disconnect {
            self.schedule_reconnect();
        }
        self.push_status(notes);
    }

    fn schedule_reconnect(&mut self) {
        let tx = self.signal_tx.clone();
        let mut retry = None;
        let mut exhausted = false;

        self.reconnect.attempt(
            move || {
                let _ = tx.send(Signal::Reconnect);
            },
            |attempt, max| retry = Some((attempt, max)),
            || exhausted = true,
        );

        if let Some((attempt, max)) = retry {
            self.stats.reconnect_attempts += 1;
            debug!(attempt, max, "Reconnect scheduled");
        }
        if exhausted {
            self.reconnect_exhausted = true;
        }
    }

    fn disconnect(&mut self, notes: &mut Vec<Notification>) {
        self.explicit_disconnect = true;
        self.reconnect.reset();

        let had_link = self.link.is_some();
        if had_link {
            self.state = ConnectionState::Closing;
            self.push_status(notes);
        }
        self.teardown_connection();

        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            self.apply_network_status(NetworkStatus::Offline);
            info!("Stream disconnected");
            self.push_status(notes);
        } else {
            self.network_status = NetworkStatus::Offline;
        }
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    fn handle_signal(&mut self, signal: Signal, notes: &mut Vec<Notification>) {
        match signal {
            Signal::Transport { generation, event } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "Ignoring stale transport event");
                    return;
                }
                self.handle_transport_event(event, notes);
            }
            Signal::HeartbeatTimeout { generation } => {
                if generation == self.generation && self.state.is_open() {
                    self.stats.heartbeat_timeouts += 1;
                    self.on_connection_lost("heartbeat timeout", notes);
                }
            }
            Signal::DrainTick { generation } => {
                if generation == self.generation {
                    self.drain_cache(self.config.drain_batch_size, notes);
                }
            }
            Signal::Reconnect => {
                if self.explicit_disconnect || self.state != ConnectionState::Disconnected {
                    return;
                }
                self.open_transport(notes);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent, notes: &mut Vec<Notification>) {
        match event {
            TransportEvent::Open => self.on_open(notes),
            TransportEvent::Message(text) => self.handle_message(&text, notes),
            TransportEvent::Error(e) => {
                warn!(error = %e, "Transport error");
                self.on_connection_lost("transport error", notes);
            }
            TransportEvent::Close { code, reason } => {
                info!(code, %reason, "Transport closed");
                self.on_connection_lost("transport closed", notes);
            }
        }
    }

    fn handle_message(&mut self, text: &str, notes: &mut Vec<Notification>) {
        let msg = match WireMessage::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Dropping malformed message");
                return;
            }
        };

        match msg {
            WireMessage::Welcome { message } => {
                info!(%message, "Server welcome");
            }
            WireMessage::Heartbeat { .. } => {
                self.last_heartbeat_ack_at = Some(self.heartbeat.ack());
            }
            WireMessage::Data { payload } => {
                self.deliver(payload, notes);
            }
            WireMessage::Control(ctrl) => {
                info!(command = ?ctrl.command, message = %ctrl.message, "Control message");
                notes.push(Notification::Control(ctrl));
            }
        }
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Validate once and forward if accepted.
    fn deliver(&mut self, event: StreamEvent, notes: &mut Vec<Notification>) {
        if !event.id.is_empty() && self.processed.contains(&event.id) {
            self.stats.replayed += 1;
            debug!(id = %event.id, "Event already processed");
            return;
        }

        let outcome = self.tracker.observe(&event);
        if !event.id.is_empty() {
            self.processed.insert(event.id.clone());
        }
        self.record_outcome(&event, &outcome, notes);

        if outcome.accepted {
            notes.push(Notification::Event(event));
        }
    }

    fn record_outcome(
        &mut self,
        event: &StreamEvent,
        outcome: &ValidationOutcome,
        notes: &mut Vec<Notification>,
    ) {
        self.stats.validated += 1;
        match outcome.rejection {
            None => {
                self.stats.accepted += 1;
                if outcome.is_out_of_order {
                    self.stats.out_of_order += 1;
                    debug!(seq = event.sequence_number, "Out-of-order event");
                }
                if outcome.lost_count > 0 {
                    self.stats.lost += outcome.lost_count;
                    warn!(
                        seq = event.sequence_number,
                        lost = outcome.lost_count,
                        "Sequence gap"
                    );
                }
            }
            Some(rejection) => {
                match rejection {
                    Rejection::MissingFields => self.stats.missing_fields += 1,
                    Rejection::Duplicate => self.stats.duplicates += 1,
                    Rejection::Stale => self.stats.stale += 1,
                }
                debug!(seq = event.sequence_number, %rejection, "Event rejected");
            }
        }

        if outcome.accuracy_delta != 0.0 {
            self.metrics = self.metrics.with_accuracy_delta(outcome.accuracy_delta);
            self.push_status(notes);
        }
    }

    fn transmit(&mut self, event: &StreamEvent) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        let text = match WireMessage::data(event.clone()).encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                return false;
            }
        };
        match link.transport.send(text) {
            Ok(()) => {
                self.stats.transmitted += 1;
                true
            }
            Err(e) => {
                warn!(error = %e, seq = event.sequence_number, "Transmit failed");
                false
            }
        }
    }

    fn can_transmit(&self) -> bool {
        self.state.is_open() && self.link.is_some() && self.network_status != NetworkStatus::Offline
    }

    fn send(&mut self, event: StreamEvent, notes: &mut Vec<Notification>) -> SendOutcome {
        if !self.can_transmit() {
            debug!(seq = event.sequence_number, "Link down, caching event");
            self.cache.add(event);
            return SendOutcome::Cached;
        }

        if !self.transmit(&event) {
            self.cache.add(event);
            return SendOutcome::Cached;
        }

        if self.network_status == NetworkStatus::Weak {
            self.cache.add(event.clone());
            self.deliver(event, notes);
            return SendOutcome::SentAndCached;
        }

        self.deliver(event, notes);
        let drained = self.drain_cache(self.config.send_drain_batch, notes);
        SendOutcome::Sent { drained }
    }

    /// Transmit up to `max_batch` cached events. Returns how many went out.
    fn drain_cache(&mut self, max_batch: usize, notes: &mut Vec<Notification>) -> usize {
        if !self.can_transmit() || self.cache.is_empty() {
            return 0;
        }

        let batch = self.cache.drain(max_batch);
        let total = batch.len();
        let mut sent = 0;
        let mut pending = batch.into_iter();

        while let Some(event) = pending.next() {
            if !self.transmit(&event) {
                let mut rest = vec![event];
                rest.extend(pending.by_ref());
                self.cache.requeue_front(rest);
                break;
            }
            sent += 1;
            self.deliver(event, notes);
        }

        if sent > 0 {
            debug!(sent, total, remaining = self.cache.len(), "Drained cached events");
        }
        sent
    }

    fn send_control(&mut self, command: ControlCommand) -> bool {
        let Some(link) = self.link.as_ref().filter(|_| self.state.is_open()) else {
            return false;
        };
        match WireMessage::control(command).encode() {
            Ok(text) => link.transport.send(text).is_ok(),
            Err(_) => false,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown_connection();
        self.reconnect.reset();
    }
}

struct Shared {
    inner: Mutex<Inner>,
    handlers: RwLock<Handlers>,
    shutdown: CancellationToken,
}

impl Shared {
    fn process(&self, signal: Signal) {
        let mut notes = Vec::new();
        self.inner.lock().handle_signal(signal, &mut notes);
        self.dispatch(notes);
    }

    fn dispatch(&self, notes: Vec<Notification>) {
        if notes.is_empty() {
            return;
        }
        let (events, statuses, controls) = {
            let h = self.handlers.read();
            (h.event.clone(), h.status.clone(), h.control.clone())
        };
        for note in notes {
            match note {
                Notification::Event(event) => events.iter().for_each(|f| f(&event)),
                Notification::Status(status) => statuses.iter().for_each(|f| f(&status)),
                Notification::Control(ctrl) => controls.iter().for_each(|f| f(&ctrl)),
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn pump(
    shared: Weak<Shared>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    shutdown: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.process(signal);
    }
    debug!("Stream client pump stopped");
}

/// Resilient stream client handle.
///
/// Cloning shares the same client. All timers stop and the transport closes
/// once the last handle is dropped.
#[derive(Clone)]
pub struct StreamClient {
    shared: Arc<Shared>,
}

impl StreamClient {
    /// Create a client over the given transport factory.
    ///
    /// Fails if the configuration is invalid. Must be called from within a
    /// Tokio runtime.
    pub fn new(config: StreamClientConfig, factory: Arc<dyn TransportFactory>) -> StreamResult<Self> {
        config.validate()?;
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let inner = Inner::new(config, factory, signal_tx)?;
        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            handlers: RwLock::new(Handlers::default()),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(pump(
            Arc::downgrade(&shared),
            signal_rx,
            shared.shutdown.clone(),
        ));
        Ok(Self { shared })
    }

    /// Create a client over `tokio-tungstenite`.
    pub fn with_websocket(config: StreamClientConfig) -> StreamResult<Self> {
        Self::new(config, Arc::new(WsTransportFactory::new()))
    }

    /// Open a connection to `url`, replacing any current one.
    pub fn connect(&self, url: impl Into<String>) {
        let mut notes = Vec::new();
        {
            let mut inner = self.shared.inner.lock();
            inner.url = Some(url.into());
            inner.explicit_disconnect = false;
            inner.reconnect_exhausted = false;
            inner.reconnect.reset();
            inner.open_transport(&mut notes);
        }
        self.shared.dispatch(notes);
    }

    /// Connect to the configured URL.
    pub fn connect_default(&self) {
        let url = self.shared.inner.lock().config.url.clone();
        self.connect(url);
    }

    /// Close the connection without reconnecting. Idempotent.
    pub fn disconnect(&self) {
        let mut notes = Vec::new();
        self.shared.inner.lock().disconnect(&mut notes);
        self.shared.dispatch(notes);
    }

    /// Send an event, caching it when the link cannot take it. Never fails.
    pub fn send(&self, event: StreamEvent) -> SendOutcome {
        let mut notes = Vec::new();
        let outcome = self.shared.inner.lock().send(event, &mut notes);
        self.shared.dispatch(notes);
        outcome
    }

    /// Record an observation of the network link and re-estimate quality.
    pub fn set_network_status(&self, status: NetworkStatus) {
        let mut notes = Vec::new();
        {
            let mut inner = self.shared.inner.lock();
            inner.apply_network_status(status);
            debug!(%status, accuracy = inner.metrics.data_accuracy, "Network status observed");
            inner.push_status(&mut notes);
        }
        self.shared.dispatch(notes);
    }

    /// Ask the server to start emitting events. `false` if not open.
    pub fn start_simulation(&self) -> bool {
        self.shared
            .inner
            .lock()
            .send_control(ControlCommand::StartSimulation)
    }

    /// Ask the server to stop emitting events. `false` if not open.
    pub fn stop_simulation(&self) -> bool {
        self.shared
            .inner
            .lock()
            .send_control(ControlCommand::StopSimulation)
    }

    /// Register an observer for accepted events.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.handlers.write().event.push(Arc::new(handler));
    }

    /// Register an observer for status changes.
    pub fn on_status_change<F>(&self, handler: F)
    where
        F: Fn(&ClientStatus) + Send + Sync + 'static,
    {
        self.shared.handlers.write().status.push(Arc::new(handler));
    }

    /// Register an observer for control acks.
    pub fn on_control<F>(&self, handler: F)
    where
        F: Fn(&ControlMessage) + Send + Sync + 'static,
    {
        self.shared.handlers.write().control.push(Arc::new(handler));
    }

    pub fn status(&self) -> ClientStatus {
        self.shared.inner.lock().status()
    }

    pub fn stats(&self) -> ClientStats {
        self.shared.inner.lock().stats()
    }

    pub fn cache_len(&self) -> usize {
        self.shared.inner.lock().cache.len()
    }

    pub fn last_heartbeat_ack_at(&self) -> Option<DateTime<Utc>> {
        self.shared.inner.lock().last_heartbeat_ack_at
    }

    /// Next sequence number the validator expects.
    pub fn expected_sequence(&self) -> u64 {
        self.shared.inner.lock().tracker.expected()
    }
}
