//! In-memory transport for driving `StreamClient` without sockets.
//!
//! The factory records every connection attempt and every frame the client
//! writes. Tests inject server frames and lifecycle events through the sink
//! of the most recent connection.

use parking_lot::Mutex;
use sentiment_ws::{
    StreamError, StreamResult, Transport, TransportEvent, TransportEventSink, TransportFactory,
    WireMessage, ABNORMAL_CLOSE,
};
use std::sync::Arc;

/// What happens when the client opens a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Report `Open` immediately.
    Accept,
    /// Report `Error` then `Close(1006)` immediately.
    Refuse,
    /// Report nothing; the test drives the lifecycle.
    Manual,
}

#[derive(Default)]
struct State {
    urls: Vec<String>,
    sinks: Vec<TransportEventSink>,
    sent: Vec<String>,
    closes: usize,
    fail_sends: bool,
}

#[derive(Clone)]
pub struct MemoryTransportFactory {
    mode: Arc<Mutex<OpenMode>>,
    state: Arc<Mutex<State>>,
}

impl MemoryTransportFactory {
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn set_mode(&self, mode: OpenMode) {
        *self.mode.lock() = mode;
    }

    /// Make every subsequent `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Sink of the `index`-th connection attempt.
    pub fn sink(&self, index: usize) -> TransportEventSink {
        self.state.lock().sinks[index].clone()
    }

    /// Emit an event on the latest connection.
    pub fn emit(&self, event: TransportEvent) {
        let sink = self
            .state
            .lock()
            .sinks
            .last()
            .cloned()
            .expect("no connection opened");
        sink.emit(event);
    }

    /// Deliver a server frame on the latest connection.
    pub fn push(&self, msg: &WireMessage) {
        self.emit(TransportEvent::Message(msg.encode().unwrap()));
    }

    pub fn push_raw(&self, text: &str) {
        self.emit(TransportEvent::Message(text.to_string()));
    }

    /// Every frame the client wrote, decoded.
    pub fn sent(&self) -> Vec<WireMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|text| WireMessage::decode(text).unwrap())
            .collect()
    }

    /// Frames of one kind (`"data"`, `"heartbeat"`, `"control"`).
    pub fn sent_of_kind(&self, kind: &str) -> Vec<WireMessage> {
        self.sent().into_iter().filter(|m| m.kind() == kind).collect()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn open(&self, url: &str, sink: TransportEventSink) -> Box<dyn Transport> {
        {
            let mut state = self.state.lock();
            state.urls.push(url.to_string());
            state.sinks.push(sink.clone());
        }

        match *self.mode.lock() {
            OpenMode::Accept => {
                sink.emit(TransportEvent::Open);
            }
            OpenMode::Refuse => {
                sink.emit(TransportEvent::Error("connection refused".to_string()));
                sink.emit(TransportEvent::Close {
                    code: ABNORMAL_CLOSE,
                    reason: "connect failed".to_string(),
                });
            }
            OpenMode::Manual => {}
        }

        Box::new(MemoryTransport {
            state: self.state.clone(),
        })
    }
}

struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl Transport for MemoryTransport {
    fn send(&self, text: String) -> StreamResult<()> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(StreamError::TransportFailure("send refused".to_string()));
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&self) {
        self.state.lock().closes += 1;
    }
}
