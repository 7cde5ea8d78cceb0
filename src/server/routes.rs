//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Ingestion webhook (shared-secret authenticated)
        .route(
            "/webhooks/scrape-complete",
            post(handlers::scrape_complete),
        )
        // Pipeline endpoints driven by the batch orchestrator
        .route("/api/pipeline/process", post(handlers::process_batch))
        .route("/api/pipeline/retry", post(handlers::retry_failed))
        .route("/api/pipeline/status", get(handlers::pipeline_status))
        // Aggregation read API
        .route(
            "/api/restaurants/:restaurant_id/flavor-index",
            get(handlers::flavor_index),
        )
        .route("/api/flavor-index/compare", get(handlers::compare))
        // Health check
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
