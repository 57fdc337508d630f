//! Search domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::quota::Tier;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Local,
    Tianxing,
    Ai,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Tianxing => "tianxing",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "tianxing" | "web" => Ok(Self::Tianxing),
            "ai" => Ok(Self::Ai),
            _ => Err(format!(
                "Invalid source '{}'. Valid options: local, tianxing, ai",
                s
            )),
        }
    }
}

/// Route that produced a resolve response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Local,
    Cache,
    Web,
    Ai,
    Degraded,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cache => "cache",
            Self::Web => "web",
            Self::Ai => "ai",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// Every route that was tried came back empty
    NoMatch,
    /// At least one paid route was skipped because a quota was exhausted
    QuotaExhausted,
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::QuotaExhausted => "quota_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Ingredient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// One recipe in a search response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub source: SearchSource,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Preparation time in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub image_url: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: SearchSource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            category: None,
            prep_time: None,
            difficulty: None,
            image_url: Vec::new(),
            description: None,
            ingredients: Vec::new(),
            steps: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Resolve request body
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ResolveRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "Query must be at most 200 characters"))]
    pub query: String,
    /// Free-form intent label from the client (part of the cache key)
    #[serde(default)]
    #[validate(length(max = 64, message = "Intent must be at most 64 characters"))]
    pub intent_type: Option<String>,
    /// Skip the cache read, like `force_refresh`
    #[serde(default)]
    pub freshness_required: bool,
    /// Tier claimed in the body; the identity header wins when present
    #[serde(default)]
    pub user_tier: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Who is searching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCaller {
    pub user_id: String,
    pub tier: Tier,
}

impl SearchCaller {
    pub fn new(user_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            user_id: user_id.into(),
            tier,
        }
    }
}

/// Resolve response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub items: Vec<SearchResult>,
    pub route_used: Route,
    pub cache_hit: bool,
    /// 0 answered normally, 1 answered after a paid route was skipped for
    /// quota, 2 nothing found
    pub degrade_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrade_reason: Option<DegradeReason>,
}

impl ResolveResponse {
    pub fn answered(items: Vec<SearchResult>, route: Route, degrade_level: u8) -> Self {
        Self {
            items,
            route_used: route,
            cache_hit: route == Route::Cache,
            degrade_level,
            degrade_reason: None,
        }
    }

    pub fn degraded(reason: DegradeReason) -> Self {
        Self {
            items: Vec::new(),
            route_used: Route::Degraded,
            cache_hit: false,
            degrade_level: 2,
            degrade_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_from_str() {
        assert_eq!("Tianxing".parse::<SearchSource>().unwrap(), SearchSource::Tianxing);
        assert_eq!("web".parse::<SearchSource>().unwrap(), SearchSource::Tianxing);
        assert!("bing".parse::<SearchSource>().is_err());
    }

    #[test]
    fn test_search_result_wire_shape() {
        let mut result = SearchResult::new("tx_1", "麻婆豆腐", SearchSource::Tianxing);
        result.category = Some("川菜".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "川菜");
        assert_eq!(json["source"], "tianxing");
        assert_eq!(json["image_url"], json!([]));
        assert!(json.get("prep_time").is_none());
    }

    #[test]
    fn test_resolve_request_defaults() {
        let req: ResolveRequest = serde_json::from_value(json!({"query": "tofu"})).unwrap();
        assert!(!req.force_refresh);
        assert!(!req.freshness_required);
        assert!(req.context.is_none());
    }

    #[test]
    fn test_resolve_request_rejects_long_query() {
        let req = ResolveRequest {
            query: "x".repeat(201),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_degraded_response_shape() {
        let json = serde_json::to_value(ResolveResponse::degraded(DegradeReason::QuotaExhausted)).unwrap();
        assert_eq!(json["route_used"], "degraded");
        assert_eq!(json["degrade_level"], 2);
        assert_eq!(json["degrade_reason"], "quota_exhausted");
        assert_eq!(json["cache_hit"], false);
    }
}
