//! Observability HTTP Routes
//!
//! Health check and, unless disabled, the metrics snapshot.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::observability::MetricsRegistry;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `/health`, plus `/metrics` when `expose_metrics` is set
pub fn observability_routes(metrics: Arc<MetricsRegistry>, expose_metrics: bool) -> Router {
    let router = Router::new().route("/health", get(health_handler));
    let router = if expose_metrics {
        router.route("/metrics", get(metrics_handler))
    } else {
        router
    };
    router.with_state(metrics)
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(metrics): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    (StatusCode::OK, Json(metrics.snapshot()))
}
