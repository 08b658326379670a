//! Read-only HTTP surface: health and directory inspection.
//!
//! Mounted next to the WebSocket endpoint. Nothing here mutates the
//! directory; pools only change through dispatches.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the HTTP surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "pool-ws-gateway", description = "Pooled WebSocket dispatch gateway"),
    paths(handlers::system::health_handler, handlers::system::directory_handler),
    components(schemas(
        handlers::system::HealthResponse,
        dto::DirectoryResponse,
        dto::PoolSummaryDto
    ))
)]
pub struct ApiDoc;

/// Builds the HTTP router with its state applied.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(handlers::routes())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
