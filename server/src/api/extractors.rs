//! Request extractors: caller identity and validated query strings

use std::net::SocketAddr;
use std::ops::Deref;

use axum::extract::rejection::QueryRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::types::ApiError;
use crate::core::constants::{MAX_USER_ID_LENGTH, USER_ID_HEADER, USER_TIER_HEADER};
use crate::domain::quota::Tier;
use crate::domain::search::SearchCaller;

/// Identity forwarded by the gateway, or an address-derived anonymous id.
///
/// Anonymous ids (`anon_<ip>`) use the first `X-Forwarded-For` hop, then the
/// peer address. They are trivially changed by rotating IPs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    /// Tier from the identity header, if any
    pub tier: Option<String>,
}

impl Caller {
    /// Identity from request headers and connection info
    pub fn from_request(headers: &HeaderMap, extensions: &Extensions) -> Result<Self, ApiError> {
        let tier = header_str(headers, USER_TIER_HEADER).map(str::to_string);

        if let Some(user_id) = header_str(headers, USER_ID_HEADER) {
            if user_id.len() > MAX_USER_ID_LENGTH || user_id.chars().any(char::is_control) {
                return Err(ApiError::bad_request(
                    "INVALID_USER_ID",
                    format!("User id must be at most {} printable characters", MAX_USER_ID_LENGTH),
                ));
            }
            return Ok(Self {
                user_id: user_id.to_string(),
                tier,
            });
        }

        let ip = header_str(headers, "X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            user_id: format!("anon_{}", ip),
            tier,
        })
    }

    /// Tier from the identity header, else the fallback claimed by the client
    pub fn tier_or(&self, fallback: Option<&str>) -> Tier {
        Tier::parse_lenient(self.tier.as_deref().or(fallback))
    }

    pub fn search_caller(&self, fallback_tier: Option<&str>) -> SearchCaller {
        SearchCaller::new(self.user_id.clone(), self.tier_or(fallback_tier))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_request(&parts.headers, &parts.extensions)
    }
}

/// Validation rejection with structured error response
pub enum ValidationRejection {
    /// Failed to parse query string
    Query(QueryRejection),
    /// Validation constraints not satisfied
    Validation(validator::ValidationErrors),
}

impl From<ValidationRejection> for ApiError {
    fn from(rejection: ValidationRejection) -> Self {
        match rejection {
            ValidationRejection::Query(rejection) => {
                ApiError::bad_request("QUERY_PARSE_ERROR", rejection.body_text())
            }
            ValidationRejection::Validation(errors) => {
                ApiError::bad_request("VALIDATION_ERROR", format_validation_errors(&errors))
            }
        }
    }
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

pub fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: validation failed", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Query extractor with automatic validation.
///
/// Deserializes query parameters and validates them using the `validator` crate.
/// Returns a `ValidationRejection` on parse or validation failure.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T> Deref for ValidatedQuery<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Query)?;
        value.validate().map_err(ValidationRejection::Validation)?;
        Ok(Self(value))
    }
}
