//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use super::upgrade::WsUpgrader;
use crate::service::{ConnectionProcessor, Dispatcher, HandshakeRequest};

/// `GET <ws path>`: verify, upgrade and dispatch one connection.
///
/// A rejected request gets the verification error as a plain HTTP response
/// and is never upgraded. Accepted requests are answered with `101` and the
/// rest of the lifecycle runs on a task of its own.
pub async fn ws_handler<E, P>(
    State(dispatcher): State<Arc<Dispatcher<E, P>>>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response
where
    E: Send + Sync + 'static,
    P: ConnectionProcessor<WebSocket, E>,
{
    let request = HandshakeRequest::new(uri, headers);
    if let Err(error) = dispatcher.verify(&request) {
        return error.into_response();
    }

    let (upgrader, response) = WsUpgrader::attach(ws);
    tokio::spawn(async move {
        let report = dispatcher.run(upgrader).await;
        tracing::debug!(
            conn_id = ?report.conn_id,
            pool_id = ?report.pool_id,
            state = %report.state(),
            errors = report.errors.len(),
            "dispatch finished"
        );
    });
    response
}

/// Mounts [`ws_handler`] at `path`.
pub fn router<E, P>(dispatcher: Arc<Dispatcher<E, P>>, path: &str) -> Router
where
    E: Send + Sync + 'static,
    P: ConnectionProcessor<WebSocket, E>,
{
    Router::new()
        .route(path, get(ws_handler::<E, P>))
        .with_state(dispatcher)
}
