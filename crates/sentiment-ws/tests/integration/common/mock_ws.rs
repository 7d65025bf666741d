//! Mock sentiment WebSocket server for integration tests.
//!
//! Behaves like the simulation server:
//! - Sends `welcome` on connect
//! - Answers `heartbeat` with `heartbeat`
//! - Acks `startSimulation` and then streams the scripted events
//! - Records every text frame it receives

use futures_util::{SinkExt, StreamExt};
use sentiment_core::StreamEvent;
use sentiment_ws::{ControlCommand, ControlMessage, WireMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    kick_tx: broadcast::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start on an available port; `script` is streamed after `startSimulation`.
    pub async fn start(script: Vec<StreamEvent>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (kick_tx, _) = broadcast::channel::<()>(4);

        let script = Arc::new(script);
        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let kick = kick_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            messages_clone.clone(),
                            connections_clone.clone(),
                            kick.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            kick_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Drop every open connection without a close frame.
    pub fn kick_all(&self) {
        let _ = self.kick_tx.send(());
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Arc<Vec<StreamEvent>>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    mut kick_rx: broadcast::Receiver<()>,
) {
    *connections.lock().await += 1;

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let welcome = WireMessage::Welcome {
        message: "Connected to sentiment stream".to_string(),
    };
    let _ = write.send(Message::Text(welcome.encode().unwrap())).await;

    loop {
        let msg = tokio::select! {
            _ = kick_rx.recv() => return,
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                messages.lock().await.push(text.clone());

                match WireMessage::decode(&text) {
                    Ok(WireMessage::Heartbeat { .. }) => {
                        let ack = WireMessage::heartbeat().encode().unwrap();
                        let _ = write.send(Message::Text(ack)).await;
                    }
                    Ok(WireMessage::Control(ControlMessage {
                        command: ControlCommand::StartSimulation,
                        ..
                    })) => {
                        let ack = WireMessage::Control(ControlMessage {
                            command: ControlCommand::SimulationStarted,
                            message: "Simulation started".to_string(),
                        });
                        let _ = write.send(Message::Text(ack.encode().unwrap())).await;
                        for event in script.iter() {
                            let frame = WireMessage::data(event.clone()).encode().unwrap();
                            let _ = write.send(Message::Text(frame)).await;
                        }
                    }
                    _ => {}
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            _ => {}
        }
    }
}
