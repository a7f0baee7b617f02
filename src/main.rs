use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docchat_backend::core::config::AppPaths;
use docchat_backend::core::logging;
use docchat_backend::server;
use docchat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths).await?;

    if !state.completion.health_check().await.unwrap_or(false) {
        tracing::warn!(
            "Completion provider '{}' is not reachable",
            state.completion.name()
        );
    }
    if !state.embedder.health_check().await.unwrap_or(false) {
        tracing::warn!(
            "Embedding provider '{}' is not reachable",
            state.embedder.name()
        );
    }

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let app: Router = server::router::router(state);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
