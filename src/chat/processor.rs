//! Per-connection chat loop.
//!
//! Reads commands from the client and forwards every message posted to the
//! connection's room back to it, until either side closes.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use tokio::sync::broadcast;

use super::messages::{ChatCommand, WsMessage, WsMessageType};
use super::room::{ChatLine, ChatRoom};
use crate::domain::ConnId;
use crate::error::BoxError;
use crate::service::{Connection, ConnectionProcessor};

/// Default upper bound for a single chat message, in bytes.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4096;

/// [`ConnectionProcessor`] running the chat protocol over a [`WebSocket`].
#[derive(Debug, Clone, Copy)]
pub struct ChatProcessor {
    max_message_len: usize,
}

impl ChatProcessor {
    /// Creates a processor accepting messages up to `max_message_len` bytes.
    #[must_use]
    pub const fn new(max_message_len: usize) -> Self {
        Self { max_message_len }
    }
}

impl Default for ChatProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl ConnectionProcessor<WebSocket, ChatRoom> for ChatProcessor {
    async fn handle(
        &self,
        conn: &mut Connection<WebSocket>,
        room: &ChatRoom,
    ) -> Result<(), BoxError> {
        let conn_id = conn.id();
        let mut room_rx = room.subscribe();

        loop {
            tokio::select! {
                // Incoming message from client
                msg = conn.stream_mut().recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_text(conn_id, text.as_str(), room).await {
                                conn.stream_mut().send(Message::text(reply)).await?;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
                // Message posted to the room
                line = room_rx.recv() => {
                    match line {
                        Ok(line) => {
                            let event = WsMessage::event(serde_json::to_value(&line)?);
                            conn.stream_mut()
                                .send(Message::text(serde_json::to_string(&event)?))
                                .await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(%conn_id, lagged = n, "chat client lagged behind room");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        tracing::debug!(
            %conn_id,
            connected_secs = (Utc::now() - conn.upgraded_at()).num_seconds(),
            "chat connection closed"
        );
        Ok(())
    }
}

impl ChatProcessor {
    /// Handles a text frame, returning the JSON reply if any.
    async fn handle_text(&self, conn_id: ConnId, text: &str, room: &ChatRoom) -> Option<String> {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            return serde_json::to_string(&WsMessage::error("", 400, "malformed JSON")).ok();
        };
        if msg.msg_type != WsMessageType::Command {
            return serde_json::to_string(&WsMessage::error(msg.id, 400, "expected a command"))
                .ok();
        }
        let Ok(command) = serde_json::from_value::<ChatCommand>(msg.payload) else {
            return serde_json::to_string(&WsMessage::error(msg.id, 404, "unknown command")).ok();
        };

        let reply = match command {
            ChatCommand::Say { text } if text.len() > self.max_message_len => {
                WsMessage::error(msg.id, 413, "message too long")
            }
            ChatCommand::Say { text } => {
                let delivered = room
                    .post(ChatLine {
                        from: conn_id,
                        text,
                        timestamp: Utc::now(),
                    })
                    .await;
                WsMessage::response(msg.id, serde_json::json!({ "delivered": delivered }))
            }
            ChatCommand::History { limit } => {
                let lines = room.history(limit).await;
                WsMessage::response(
                    msg.id,
                    serde_json::json!({ "count": lines.len(), "messages": lines }),
                )
            }
        };
        serde_json::to_string(&reply).ok()
    }
}
