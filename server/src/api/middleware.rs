//! HTTP middleware (CORS, 404 handler)

use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::IntoResponse;
use tower_http::cors::{Any, CorsLayer};

use super::types::ApiError;

/// Create CORS layer
///
/// Credentials live in the gateway; this service accepts any origin without cookies.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("idempotency-key"),
            header::HeaderName::from_static("x-user-id"),
            header::HeaderName::from_static("x-user-tier"),
        ])
}

/// Handle 404 Not Found with logging
pub async fn handle_404(req: Request) -> impl IntoResponse {
    tracing::debug!(method = %req.method(), uri = %req.uri(), "[404] No route");
    ApiError::not_found(format!("No route for {} {}", req.method(), req.uri().path()))
}

#[cfg(test)]
mod tests {
    use crate::core::constants::{IDEMPOTENCY_HEADER, USER_ID_HEADER, USER_TIER_HEADER};

    #[test]
    fn test_cors_header_names_match_constants() {
        assert!(IDEMPOTENCY_HEADER.eq_ignore_ascii_case("idempotency-key"));
        assert!(USER_ID_HEADER.eq_ignore_ascii_case("x-user-id"));
        assert!(USER_TIER_HEADER.eq_ignore_ascii_case("x-user-tier"));
    }
}
