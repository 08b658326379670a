//! Bridges axum's callback-style upgrade to the [`Upgrader`] contract.
//!
//! axum only hands out the [`WebSocket`] inside the `on_upgrade` callback,
//! after the `101 Switching Protocols` response has been sent. The callback
//! forwards the socket through a oneshot channel to the task running the
//! dispatch. If the handshake never completes, the callback is dropped with
//! its sender and the dispatch observes an upgrade failure.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::oneshot;

use crate::error::{BoxError, DispatchError};
use crate::service::{Transport, Upgrader};

/// Pending upgrade of one request.
#[derive(Debug)]
pub struct WsUpgrader {
    socket_rx: oneshot::Receiver<WebSocket>,
}

impl WsUpgrader {
    /// Consumes the axum upgrade extractor, returning the upgrader and the
    /// `101` response to send back to the client.
    #[must_use]
    pub fn attach(ws: WebSocketUpgrade) -> (Self, Response) {
        let (socket_tx, socket_rx) = oneshot::channel();
        let response = ws
            .on_failed_upgrade(|error: axum::Error| {
                tracing::debug!(%error, "websocket handshake failed");
            })
            .on_upgrade(move |socket| async move {
                // Receiver gone means the dispatch task died; the socket is
                // dropped and closed here.
                let _ = socket_tx.send(socket);
            });
        (Self { socket_rx }, response)
    }
}

impl Upgrader for WsUpgrader {
    type Stream = WebSocket;

    async fn upgrade(self) -> Result<WebSocket, BoxError> {
        self.socket_rx
            .await
            .map_err(|_| "connection dropped before the websocket handshake completed".into())
    }
}

impl Transport for WebSocket {
    async fn close(mut self, error: &DispatchError) {
        let frame = CloseFrame {
            code: error.close_code(),
            reason: Utf8Bytes::from_static(error.close_reason()),
        };
        if let Err(err) = self.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %err, "failed to send close frame");
        }
    }
}
