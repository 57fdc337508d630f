//! Rate limiting middleware for the search routes

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::extractors::Caller;
use crate::core::MetricsService;
use crate::data::kv::{RateLimitBucket, RateLimitResult, RateLimiter};

/// Rate limit middleware state
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub bucket: RateLimitBucket,
    pub metrics: Arc<MetricsService>,
}

/// Rate limit exceeded response
pub struct RateLimitExceeded(RateLimitResult);

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let r = &self.0;
        let retry_after = r.retry_after.unwrap_or(60);
        let body = axum::Json(serde_json::json!({
            "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
            "error": "RATE_LIMITED",
            "message": format!("Rate limit exceeded, retry in {}s", retry_after),
            "data": null
        }));

        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        add_rate_limit_headers(&mut response, r);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

/// Add rate limit headers to response
fn add_rate_limit_headers(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(result.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(result.reset_at));
}

/// Rate limiting middleware function, keyed by caller identity
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let caller = match Caller::from_request(request.headers(), request.extensions()) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };

    let result = state.limiter.check(&state.bucket, &caller.user_id).await;

    if !result.allowed {
        tracing::debug!(
            bucket = state.bucket.name,
            user_id = %caller.user_id,
            "Rate limit exceeded"
        );
        state.metrics.record_rate_limited();
        return RateLimitExceeded(result).into_response();
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(&mut response, &result);
    response
}
