//! pool-ws-gateway server entry point.
//!
//! Serves the divided chat rooms application: a WebSocket endpoint whose
//! connections are grouped into rooms, plus `/health` and `/directory`.

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pool_ws_gateway::chat::ChatApp;
use pool_ws_gateway::config::GatewayConfig;
use pool_ws_gateway::domain::DirectoryEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid configuration")?;
    tracing::info!(
        addr = %config.listen_addr,
        ws_path = %config.ws_path,
        pool_capacity = config.pool_capacity,
        max_pools = config.max_pools,
        auth = config.auth_token.is_some(),
        "starting pool-ws-gateway"
    );

    let app = ChatApp::build(&config);

    // Log pool churn
    let mut events = app.dispatcher.directory().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ (DirectoryEvent::PoolCreated { .. } | DirectoryEvent::PoolRemoved { .. })) => {
                    tracing::debug!(
                        pool_id = %event.pool_id(),
                        event = event.event_type_str(),
                        "directory changed"
                    );
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "directory event monitor lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let router = app.router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, router).await?;

    Ok(())
}
