//! Integration tests for sentiment-ws.
//!
//! These tests drive `StreamClient` end to end:
//! - Connection lifecycle, heartbeat and reconnection over an in-memory transport
//! - Send paths per network status
//! - Real WebSocket round trips against a local mock server

pub mod common;
