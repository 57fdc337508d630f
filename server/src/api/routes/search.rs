//! Search endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::extractors::{Caller, ValidatedQuery, format_validation_errors};
use crate::api::types::{ApiError, ApiResponse};
use crate::core::constants::{
    IDEMPOTENCY_HEADER, IDEMPOTENCY_KEY_MAX_LEN, IDEMPOTENCY_REPLAYED_HEADER, IDEMPOTENCY_TTL_SECS,
};
use crate::data::kv::BeginState;
use crate::domain::IdempotencyService;
use crate::domain::search::{ResolveRequest, ResolveResponse, SearchResult, SearchService, SearchSource};

/// Idempotency namespace for resolve calls
const RESOLVE_NAMESPACE: &str = "search-resolve";

#[derive(Clone)]
pub struct SearchApiState {
    pub search: Arc<SearchService>,
    pub idempotency: Arc<IdempotencyService>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct KeywordQuery {
    #[validate(length(max = 200, message = "Keyword must be at most 200 characters"))]
    pub keyword: Option<String>,
}

impl KeywordQuery {
    fn required(&self) -> Result<&str, ApiError> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::bad_request("MISSING_KEYWORD", "keyword is required"))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourceSearchResponse {
    pub source: SearchSource,
    pub items: Vec<SearchResult>,
}

pub fn routes(search: Arc<SearchService>, idempotency: Arc<IdempotencyService>) -> Router<()> {
    let state = SearchApiState {
        search,
        idempotency,
    };

    Router::new()
        .route("/", get(search_keyword))
        .route("/resolve", post(resolve))
        .route("/source/{source}", get(search_source))
        .with_state(state)
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::bad_request("INVALID_IDEMPOTENCY_KEY", "Idempotency-Key must be ASCII"))?;
    if key.is_empty() || key.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(ApiError::bad_request(
            "INVALID_IDEMPOTENCY_KEY",
            format!(
                "Idempotency-Key must be 1 to {} characters",
                IDEMPOTENCY_KEY_MAX_LEN
            ),
        ));
    }
    Ok(Some(key.to_string()))
}

fn parse_resolve_body(body: &[u8]) -> Result<ResolveRequest, ApiError> {
    let request: ResolveRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request("INVALID_BODY", e.to_string()))?;
    request
        .validate()
        .map_err(|e| ApiError::bad_request("VALIDATION_ERROR", format_validation_errors(&e)))?;
    Ok(request)
}

/// Resolve a search through cache, local, web and AI
#[utoipa::path(
    post,
    path = "/search/resolve",
    tag = "search",
    request_body = ResolveRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Makes retries of this request safe"),
        ("X-User-Id" = Option<String>, Header, description = "Caller id set by the gateway"),
        ("X-User-Tier" = Option<String>, Header, description = "Caller tier set by the gateway")
    ),
    responses(
        (status = 200, description = "Search resolved", body = ResolveResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Idempotency key in flight or reused with a different body"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn resolve(
    State(state): State<SearchApiState>,
    caller: Caller,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_resolve_body(&body)?;
    let search_caller = caller.search_caller(request.user_tier.as_deref());

    let Some(key) = idempotency_key(&headers)? else {
        let response = state.search.resolve(&search_caller, &request).await;
        return Ok(ApiResponse::ok(response).into_response());
    };

    let ttl = Duration::from_secs(IDEMPOTENCY_TTL_SECS);
    match state
        .idempotency
        .begin(RESOLVE_NAMESPACE, &key, &body, ttl)
        .await
    {
        BeginState::Proceed => {
            let response = state.search.resolve(&search_caller, &request).await;
            match serde_json::to_value(&response) {
                Ok(payload) => {
                    state
                        .idempotency
                        .complete(RESOLVE_NAMESPACE, &key, &body, &payload, ttl)
                        .await
                }
                Err(e) => tracing::warn!(%key, error = %e, "Failed to encode resolve response"),
            }
            Ok(ApiResponse::ok(response).into_response())
        }
        BeginState::Replay => match state.idempotency.replay(RESOLVE_NAMESPACE, &key).await {
            Some(payload) => {
                let mut response = ApiResponse::ok(payload).into_response();
                response
                    .headers_mut()
                    .insert(IDEMPOTENCY_REPLAYED_HEADER, HeaderValue::from_static("true"));
                Ok(response)
            }
            None => Err(ApiError::conflict(
                "IDEMPOTENCY_CONFLICT",
                "Stored response for this Idempotency-Key is unavailable",
            )),
        },
        BeginState::Conflict => Err(ApiError::conflict(
            "IDEMPOTENCY_CONFLICT",
            "Idempotency-Key is in flight or was used with a different body",
        )),
    }
}

/// Single keyword search
#[utoipa::path(
    get,
    path = "/search",
    tag = "search",
    params(("keyword" = String, Query, description = "Search keyword")),
    responses(
        (status = 200, description = "Search resolved", body = ResolveResponse),
        (status = 400, description = "Missing keyword")
    )
)]
pub async fn search_keyword(
    State(state): State<SearchApiState>,
    caller: Caller,
    ValidatedQuery(query): ValidatedQuery<KeywordQuery>,
) -> Result<ApiResponse<ResolveResponse>, ApiError> {
    let keyword = query.required()?;
    let response = state
        .search
        .search_keyword(&caller.search_caller(None), keyword)
        .await;
    Ok(ApiResponse::ok(response))
}

/// Call one source directly, bypassing cache and quota
#[utoipa::path(
    get,
    path = "/search/source/{source}",
    tag = "search",
    params(
        ("source" = String, Path, description = "local, tianxing or ai"),
        ("keyword" = String, Query, description = "Search keyword")
    ),
    responses(
        (status = 200, description = "Source results", body = SourceSearchResponse),
        (status = 400, description = "Unknown source or missing keyword")
    )
)]
pub async fn search_source(
    State(state): State<SearchApiState>,
    Path(source): Path<String>,
    ValidatedQuery(query): ValidatedQuery<KeywordQuery>,
) -> Result<ApiResponse<SourceSearchResponse>, ApiError> {
    let source: SearchSource = source
        .parse()
        .map_err(|e: String| ApiError::bad_request("INVALID_SOURCE", e))?;
    let keyword = query.required()?;
    let items = state.search.search_source(source, keyword).await;
    Ok(ApiResponse::ok(SourceSearchResponse { source, items }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_absent() {
        assert_eq!(idempotency_key(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_idempotency_key_length() {
        let mut headers = HeaderMap::new();
        headers.insert(
            IDEMPOTENCY_HEADER,
            HeaderValue::from_str(&"k".repeat(IDEMPOTENCY_KEY_MAX_LEN + 1)).unwrap(),
        );
        assert!(idempotency_key(&headers).is_err());

        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(idempotency_key(&headers).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_resolve_body() {
        let request = parse_resolve_body(br#"{"query":"mapo tofu","force_refresh":true}"#).unwrap();
        assert_eq!(request.query, "mapo tofu");
        assert!(request.force_refresh);

        assert!(parse_resolve_body(b"not json").is_err());
        let long = format!(r#"{{"query":"{}"}}"#, "a".repeat(201));
        assert!(parse_resolve_body(long.as_bytes()).is_err());
    }

    #[test]
    fn test_keyword_required() {
        let query = KeywordQuery {
            keyword: Some("  ".to_string()),
        };
        assert!(query.required().is_err());
        let query = KeywordQuery {
            keyword: Some(" egg ".to_string()),
        };
        assert_eq!(query.required().unwrap(), "egg");
    }
}
