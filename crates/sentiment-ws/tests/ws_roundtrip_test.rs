//! WebSocket round trips against a local mock server.
//!
//! Tests the tungstenite transport end to end:
//! - Connection establishment and simulation control
//! - Heartbeat acks
//! - Reconnection after the server drops the socket

mod integration;
use integration::common::mock_ws::MockWsServer;

use parking_lot::Mutex;
use sentiment_core::{ConnectionState, Sentiment, StreamEvent};
use sentiment_ws::{StreamClient, StreamClientConfig, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn fast_config(url: String) -> StreamClientConfig {
    StreamClientConfig {
        url,
        heartbeat_interval_ms: 200,
        heartbeat_timeout_ms: 150,
        retry_delay_ms: 100,
        drain_interval_ms: 50,
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    let reached = timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

fn script() -> Vec<StreamEvent> {
    (1..=3)
        .map(|seq| {
            StreamEvent::new(
                format!("srv-{seq}"),
                seq,
                format!("market update {seq}"),
                "mock",
                Sentiment::Negative,
            )
        })
        .collect()
}

#[tokio::test]
async fn test_ws_simulation_streams_events() {
    let server = MockWsServer::start(script()).await;
    let client = StreamClient::with_websocket(fast_config(server.url())).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    client.on_event(move |event| e.lock().push(event.sequence_number));

    client.connect_default();
    wait_for("open", || client.status().connection_state == ConnectionState::Open).await;

    assert!(client.start_simulation());
    wait_for("events", || events.lock().len() == 3).await;
    assert_eq!(*events.lock(), vec![1, 2, 3]);

    let received = server.received_messages().await;
    assert!(received
        .iter()
        .any(|m| m.contains(r#""command":"startSimulation""#)));

    client.disconnect();
    server.shutdown().await;
}

#[tokio::test]
async fn test_ws_heartbeat_acks_keep_connection_open() {
    let server = MockWsServer::start(Vec::new()).await;
    let client = StreamClient::with_websocket(fast_config(server.url())).unwrap();

    client.connect_default();
    wait_for("open", || client.status().connection_state == ConnectionState::Open).await;
    wait_for("heartbeat ack", || client.last_heartbeat_ack_at().is_some()).await;

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(client.status().connection_state, ConnectionState::Open);
    assert_eq!(client.stats().heartbeat_timeouts, 0);
    assert_eq!(server.connection_count().await, 1);

    let probes = server
        .received_messages()
        .await
        .iter()
        .filter(|m| matches!(WireMessage::decode(m), Ok(WireMessage::Heartbeat { .. })))
        .count();
    assert!(probes >= 2, "expected repeated probes, got {probes}");

    client.disconnect();
    server.shutdown().await;
}

#[tokio::test]
async fn test_ws_reconnects_after_server_drop() {
    let server = MockWsServer::start(Vec::new()).await;
    let client = StreamClient::with_websocket(fast_config(server.url())).unwrap();

    client.connect_default();
    wait_for("open", || client.status().connection_state == ConnectionState::Open).await;

    server.kick_all();
    let reconnected = timeout(Duration::from_secs(5), async {
        while server.connection_count().await < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "client did not reconnect");

    wait_for("reopen", || client.status().connection_state == ConnectionState::Open).await;
    assert_eq!(client.status().retry_count, 0);
    assert_eq!(client.stats().reconnect_attempts, 1);

    client.disconnect();
    server.shutdown().await;
}

#[tokio::test]
async fn test_ws_unreachable_server_reports_exhaustion() {
    // Bind and drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = StreamClientConfig {
        max_retries: 2,
        ..fast_config(url)
    };
    let client = StreamClient::with_websocket(config).unwrap();
    client.connect_default();

    wait_for("exhaustion", || client.status().reconnect_exhausted).await;
    assert_eq!(client.status().connection_state, ConnectionState::Disconnected);
    assert_eq!(client.stats().reconnect_attempts, 2);
}
