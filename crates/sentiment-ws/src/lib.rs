//! Resilient WebSocket client for the sentiment event stream.
//!
//! Provides a stream client that survives flaky links:
//! - Sequence validation (duplicates, gaps, stale and incomplete events)
//! - Bounded pending-event cache with background and opportunistic drain
//! - Heartbeat monitoring (30s probe, 5s ack timeout)
//! - Bounded reconnection (5 attempts, 3s fixed or exponential backoff)
//! - Network quality estimation (accuracy and delay)
//! - Pluggable transport with a `tokio-tungstenite` implementation

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod quality;
pub mod reconnect;
pub mod timer;
pub mod transport;
pub mod validator;

pub use cache::StreamCache;
pub use client::{ClientStats, SendOutcome, StreamClient};
pub use config::StreamClientConfig;
pub use error::{StreamError, StreamResult};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStats};
pub use message::{ControlCommand, ControlMessage, WireMessage};
pub use reconnect::{Backoff, ReconnectDecision, ReconnectPolicy};
pub use timer::TimerHandle;
pub use transport::{
    Transport, TransportEvent, TransportEventSink, TransportFactory, WsTransportFactory,
    ABNORMAL_CLOSE, NORMAL_CLOSE,
};
pub use validator::{validate, validate_at, Rejection, SequenceTracker, ValidationOutcome};
