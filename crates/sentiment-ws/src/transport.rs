//! Transport abstraction and the WebSocket implementation.
//!
//! The client never touches a socket directly: it asks a `TransportFactory`
//! for a `Transport` handle and receives lifecycle and message events
//! through a `TransportEventSink`. Opening is non-blocking; the outcome is
//! reported as `Open` or `Error` + `Close`.

use crate::client::Signal;
use crate::error::{StreamError, StreamResult};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Close code used when the connection dropped without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;
/// Close code for an orderly close.
pub const NORMAL_CLOSE: u16 = 1000;

/// Event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close { code: u16, reason: String },
    Error(String),
}

/// Delivers transport events to the owning client.
///
/// Each sink is bound to one connection attempt; events from a transport
/// the client has since replaced are discarded by the client.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Signal>,
}

impl TransportEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { generation, tx }
    }

    /// Report an event. Returns `false` if the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Signal::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Handle to one live connection.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Queue a text frame. Must not block.
    fn send(&self, text: String) -> StreamResult<()>;

    /// Begin closing. Idempotent.
    fn close(&self);
}

/// Creates transports for a URL.
pub trait TransportFactory: Send + Sync {
    fn open(&self, url: &str, sink: TransportEventSink) -> Box<dyn Transport>;
}

/// `tokio-tungstenite` backed transport factory.
#[derive(Debug, Clone, Default)]
pub struct WsTransportFactory;

impl WsTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WsTransportFactory {
    fn open(&self, url: &str, sink: TransportEventSink) -> Box<dyn Transport> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        tokio::spawn(run_connection(
            url.to_string(),
            sink,
            outbound_rx,
            token.clone(),
        ));
        Box::new(WsTransport { outbound_tx, token })
    }
}

/// Write side of a tungstenite connection task.
struct WsTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    token: CancellationToken,
}

impl Transport for WsTransport {
    fn send(&self, text: String) -> StreamResult<()> {
        if self.token.is_cancelled() {
            return Err(StreamError::TransportFailure("transport closed".to_string()));
        }
        self.outbound_tx
            .send(text)
            .map_err(|_| StreamError::TransportFailure("connection task ended".to_string()))
    }

    fn close(&self) {
        self.token.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_connection(
    url: String,
    sink: TransportEventSink,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
) {
    info!(url = %url, generation = sink.generation(), "Connecting to WebSocket");

    let connected = tokio::select! {
        biased;
        () = token.cancelled() => {
            debug!("Connect cancelled before completion");
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let (ws_stream, _response) = match connected {
        Ok(ok) => ok,
        Err(e) => {
            warn!(?e, "WebSocket connect failed");
            sink.emit(TransportEvent::Error(e.to_string()));
            sink.emit(TransportEvent::Close {
                code: ABNORMAL_CLOSE,
                reason: "connect failed".to_string(),
            });
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    sink.emit(TransportEvent::Open);

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(?e, "Failed to send Close frame");
                }
                sink.emit(TransportEvent::Close {
                    code: NORMAL_CLOSE,
                    reason: "closed by client".to_string(),
                });
                return;
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(?e, "WebSocket write error");
                    sink.emit(TransportEvent::Error(e.to_string()));
                    sink.emit(TransportEvent::Close {
                        code: ABNORMAL_CLOSE,
                        reason: "write failed".to_string(),
                    });
                    return;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        sink.emit(TransportEvent::Message(text));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            debug!(?e, "Failed to answer ping");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((NORMAL_CLOSE, "Normal close".to_string()));
                        info!(code, %reason, "WebSocket closed by server");
                        sink.emit(TransportEvent::Close { code, reason });
                        return;
                    }
                    Some(Err(e)) => {
                        warn!(?e, "WebSocket read error");
                        sink.emit(TransportEvent::Error(e.to_string()));
                        sink.emit(TransportEvent::Close {
                            code: ABNORMAL_CLOSE,
                            reason: "read failed".to_string(),
                        });
                        return;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        sink.emit(TransportEvent::Close {
                            code: ABNORMAL_CLOSE,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
