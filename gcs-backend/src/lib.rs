//! Ground-station telemetry backend: generates sensor samples on a fixed
//! cadence, persists them, pushes them to live subscribers over SSE and
//! serves historical range queries.

pub mod broadcast;
pub mod config;
pub mod errors;
pub mod generator;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod rest;
pub mod store;
pub mod validate;

use axum::{http::StatusCode, routing::get, Router};
use tower_http::cors::CorsLayer;
use tracing::error;

pub use rest::AppState;

pub use rest::cors_layer;

/// Full HTTP surface: REST + SSE routes, `/metrics`, JSON 404 fallback, CORS.
pub fn build_app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(state))
        .fallback(rest::not_found)
        .layer(cors)
}

async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
