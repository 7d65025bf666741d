//! Wire message types.
//!
//! Every frame is a JSON object with a `type` discriminator:
//! - `welcome`: greeting sent by the server on connect
//! - `heartbeat`: liveness probe (client) or ack/broadcast (server)
//! - `data`: a `StreamEvent` payload
//! - `control`: simulation commands and their acks

use crate::error::{StreamError, StreamResult};
use sentiment_core::{now_ms, StreamEvent};
use serde::{Deserialize, Serialize};

/// Simulation control commands and acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    /// Ask the server to start emitting events.
    StartSimulation,
    /// Ask the server to stop emitting events.
    StopSimulation,
    /// Server ack for `StartSimulation`.
    SimulationStarted,
    /// Server ack for `StopSimulation`.
    SimulationStopped,
}

impl ControlCommand {
    /// Check if this is a server acknowledgement rather than a request.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::SimulationStarted | Self::SimulationStopped)
    }
}

/// Control frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub command: ControlCommand,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Welcome {
        #[serde(default)]
        message: String,
    },
    Heartbeat {
        #[serde(default)]
        timestamp: i64,
    },
    Data {
        payload: StreamEvent,
    },
    Control(ControlMessage),
}

impl WireMessage {
    /// Heartbeat probe stamped with the current time.
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: now_ms(),
        }
    }

    pub fn data(event: StreamEvent) -> Self {
        Self::Data { payload: event }
    }

    pub fn control(command: ControlCommand) -> Self {
        Self::Control(ControlMessage {
            command,
            message: String::new(),
        })
    }

    /// Frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Data { .. } => "data",
            Self::Control(_) => "control",
        }
    }

    /// Decode a text frame.
    ///
    /// Any JSON or shape error is reported as `MalformedMessage`.
    pub fn decode(text: &str) -> StreamResult<Self> {
        serde_json::from_str(text).map_err(|e| StreamError::MalformedMessage(e.to_string()))
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiment_core::Sentiment;
    use serde_json::json;

    #[test]
    fn test_decode_welcome() {
        let msg = WireMessage::decode(r#"{"type":"welcome","message":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            WireMessage::Welcome {
                message: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_decode_data_frame() {
        let raw = json!({
            "type": "data",
            "payload": {
                "id": "a1",
                "sequenceNumber": 5,
                "title": "Policy change sparks debate",
                "source": "forum",
                "timestamp": 1700000000000i64,
                "sentiment": "neutral"
            }
        })
        .to_string();

        match WireMessage::decode(&raw).unwrap() {
            WireMessage::Data { payload } => {
                assert_eq!(payload.sequence_number, 5);
                assert_eq!(payload.sentiment, Sentiment::Neutral);
            }
            other => panic!("Expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_control_ack() {
        let raw = r#"{"type":"control","command":"simulationStarted","message":"started"}"#;
        match WireMessage::decode(raw).unwrap() {
            WireMessage::Control(ctrl) => {
                assert_eq!(ctrl.command, ControlCommand::SimulationStarted);
                assert!(ctrl.command.is_ack());
                assert_eq!(ctrl.message, "started");
            }
            other => panic!("Expected control frame, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_control_request() {
        let text = WireMessage::control(ControlCommand::StartSimulation)
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "control", "command": "startSimulation"}));
    }

    #[test]
    fn test_encode_heartbeat_probe() {
        let text = WireMessage::heartbeat().encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_malformed_inputs() {
        for raw in [
            "not json",
            "{}",
            r#"{"type":"unknown"}"#,
            r#"{"type":"data"}"#,
            r#"{"type":"control","command":"reboot"}"#,
        ] {
            assert!(
                matches!(WireMessage::decode(raw), Err(StreamError::MalformedMessage(_))),
                "{raw} should be malformed"
            );
        }
    }
}
