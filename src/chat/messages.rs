//! Chat wire format: message envelope, commands and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for commands; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send, carried in the envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ChatCommand {
    /// Post a message to everyone in the room.
    Say {
        /// Message text.
        text: String,
    },
    /// Fetch recent room messages, oldest first.
    History {
        /// Maximum number of messages; the whole buffer when absent.
        #[serde(default)]
        limit: Option<usize>,
    },
}

impl WsMessage {
    /// Response to the command with the given id.
    #[must_use]
    pub fn response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(id.into(), WsMessageType::Response, payload)
    }

    /// Server-originated event with a fresh id.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            WsMessageType::Event,
            payload,
        )
    }

    /// Error reply to the command with the given id.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: &str) -> Self {
        Self::new(
            id.into(),
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    fn new(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_say_command() {
        let raw = r#"{
            "id": "c1",
            "type": "command",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": { "command": "say", "text": "hello" }
        }"#;
        let Ok(msg) = serde_json::from_str::<WsMessage>(raw) else {
            panic!("envelope should parse");
        };
        assert_eq!(msg.msg_type, WsMessageType::Command);
        let Ok(cmd) = serde_json::from_value::<ChatCommand>(msg.payload) else {
            panic!("command should parse");
        };
        assert_eq!(
            cmd,
            ChatCommand::Say {
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn history_limit_is_optional() {
        let Ok(cmd) = serde_json::from_value::<ChatCommand>(serde_json::json!({
            "command": "history"
        })) else {
            panic!("command should parse");
        };
        assert_eq!(cmd, ChatCommand::History { limit: None });
    }

    #[test]
    fn error_envelope_shape() {
        let msg = WsMessage::error("c9", 400, "malformed JSON");
        let Ok(value) = serde_json::to_value(&msg) else {
            panic!("serialization failed");
        };
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("error"));
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some("c9"));
        assert_eq!(
            value.pointer("/payload/code").and_then(serde_json::Value::as_u64),
            Some(400)
        );
    }
}
