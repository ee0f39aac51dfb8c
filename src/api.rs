// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! HTTP API — runs alongside the inference process.
//!
//! Endpoints:
//!   GET /healthz  → liveness probe (JSON)
//!   GET /metrics  → Prometheus text exposition

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared state passed to all handlers.
pub struct AppState {
    pub prometheus_handle: PrometheusHandle,
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/metrics", get(handle_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server. Binds `addr` (e.g. `0.0.0.0:8080`).
pub async fn start_server(state: Arc<AppState>, addr: &str) {
    let app = build_router(state);
    info!(%addr, "HTTP API listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}

async fn handle_healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "service": "multicam-infer",
            "status": "ok",
        })),
    )
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.prometheus_handle.render())
}
