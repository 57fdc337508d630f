//! Quota status endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::api::extractors::Caller;
use crate::api::types::ApiResponse;
use crate::domain::QuotaService;
use crate::domain::quota::QuotaSnapshot;

#[derive(Clone)]
pub struct QuotaApiState {
    pub quota: Arc<QuotaService>,
}

pub fn routes(quota: Arc<QuotaService>) -> Router<()> {
    Router::new()
        .route("/status", get(quota_status))
        .with_state(QuotaApiState { quota })
}

/// Today's usage for the calling identity
#[utoipa::path(
    get,
    path = "/quota/status",
    tag = "quota",
    params(
        ("X-User-Id" = Option<String>, Header, description = "Caller id set by the gateway"),
        ("X-User-Tier" = Option<String>, Header, description = "Caller tier set by the gateway")
    ),
    responses(
        (status = 200, description = "Quota usage", body = QuotaSnapshot)
    )
)]
pub async fn quota_status(
    State(state): State<QuotaApiState>,
    caller: Caller,
) -> ApiResponse<QuotaSnapshot> {
    let snapshot = state
        .quota
        .status(&caller.user_id, caller.tier_or(None))
        .await;
    ApiResponse::ok(snapshot)
}
