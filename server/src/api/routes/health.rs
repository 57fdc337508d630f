//! Health check and metrics endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::types::ApiResponse;
use crate::core::MetricsService;
use crate::data::KvClient;

#[derive(Clone)]
pub struct HealthApiState {
    pub kv: Arc<KvClient>,
    pub metrics: Arc<MetricsService>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the shared KV is unreachable
    pub status: &'static str,
    pub version: &'static str,
    pub kv_ready: bool,
    /// Store currently answering quota and cache calls
    pub kv_backend: &'static str,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<HealthApiState>) -> ApiResponse<HealthResponse> {
    let kv_ready = state.kv.ping().await;
    let status = if kv_ready || !state.kv.is_enabled() {
        "ok"
    } else {
        "degraded"
    };
    ApiResponse::ok(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        kv_ready,
        kv_backend: state.kv.backend_name(),
    })
}

/// Prometheus text exposition
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Prometheus metrics", body = String, content_type = "text/plain")
    )
)]
pub async fn metrics(State(state): State<HealthApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
