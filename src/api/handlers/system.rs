//! System endpoints: health check and directory inspection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::DirectoryResponse;
use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    uptime_secs: i64,
}

/// `GET /health`: service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, uptime and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: now.to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (now - state.started_at).num_seconds(),
        }),
    )
}

/// `GET /directory`: live pools in first-fit order.
#[utoipa::path(
    get,
    path = "/directory",
    tag = "System",
    summary = "Inspect the pool directory",
    description = "Returns the number of live pools and connections, the pool ceiling, and a summary of every pool in the order new connections fill them.",
    responses(
        (status = 200, description = "Directory snapshot", body = DirectoryResponse),
    )
)]
pub async fn directory_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.directory.directory_snapshot().await;
    (StatusCode::OK, Json(DirectoryResponse::from(snapshot)))
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/directory", get(directory_handler))
}
