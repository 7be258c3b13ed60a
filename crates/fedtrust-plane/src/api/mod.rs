//! API module for the federation plane server

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Key sets and statements are fetched cross-origin by browser-based verifiers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Key bundles
        .route("/v1/bundles", get(handlers::list_bundles))
        .route("/v1/bundles/{name}", get(handlers::get_bundle).put(handlers::put_bundle))
        // Statements
        .route("/v1/statements", get(handlers::list_statements))
        .route("/v1/statements/verify", post(handlers::verify_statement))
        .route("/v1/statements/{name}", get(handlers::get_statement))
        // Hosted operator
        .route("/v1/operator", get(handlers::get_operator_info))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
