//! Core domain types for the sentiment event stream.
//!
//! This crate provides the types shared by the stream client and its consumers:
//! - `StreamEvent`: A sequence-numbered sentiment event
//! - `ConnectionState`, `NetworkStatus`: Client lifecycle and link quality
//! - `QualityMetrics`: Data accuracy and real-time delay estimates
//! - `ClientStatus`: Snapshot published on every status change

pub mod error;
pub mod event;
pub mod status;

pub use error::{CoreError, Result};
pub use event::{now_ms, EventId, Sentiment, StreamEvent};
pub use status::{ClientStatus, ConnectionState, NetworkStatus, QualityMetrics};
