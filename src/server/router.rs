use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers;
use crate::state::AppState;

/// Thin route layer over the pipeline and the stores; all semantics live
/// below it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ask", post(handlers::ask))
        .route("/ingest", post(handlers::ingest))
        .route("/topics", get(handlers::list_topics))
        .route("/topics/delete", post(handlers::delete_topic))
        .route("/chat-history", post(handlers::chat_history))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
