use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::text::{parse_ingredients, repair_text, split_steps, value_text};
use super::{AdapterError, DailyUsage, SearchAdapter, absorb};
use crate::core::constants::TIANXING_RESULT_COUNT;
use crate::domain::search::types::{SearchResult, SearchSource};

/// Upstream code for "no matching data"
const TIANXING_NO_DATA: i64 = 250;

#[derive(Debug, Deserialize)]
struct TianxingResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    result: Option<TianxingResult>,
}

#[derive(Debug, Default, Deserialize)]
struct TianxingResult {
    #[serde(default)]
    list: Vec<TianxingRecipe>,
}

#[derive(Debug, Deserialize)]
struct TianxingRecipe {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    cp_name: Option<String>,
    /// Method
    #[serde(default)]
    zuofa: Option<String>,
    /// Characteristics
    #[serde(default)]
    texing: Option<String>,
    /// Tips
    #[serde(default)]
    tishi: Option<String>,
    /// Seasonings
    #[serde(default)]
    tiaoliao: Option<String>,
    /// Main ingredients
    #[serde(default)]
    yuanliao: Option<String>,
}

/// Map a Tianxing `caipu` response body into results
pub fn parse_tianxing(body: &str) -> Result<Vec<SearchResult>, AdapterError> {
    let response: TianxingResponse =
        serde_json::from_str(body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

    match response.code {
        200 => {}
        TIANXING_NO_DATA => return Ok(Vec::new()),
        code => {
            return Err(AdapterError::Upstream {
                code,
                message: response.msg,
            });
        }
    }

    let list = response.result.unwrap_or_default().list;
    Ok(list.into_iter().filter_map(to_result).collect())
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| repair_text(&t)).filter(|t| !t.is_empty())
}

fn to_result(recipe: TianxingRecipe) -> Option<SearchResult> {
    let name = non_empty(recipe.cp_name)?;
    let id = value_text(&recipe.id).unwrap_or_else(|| crate::utils::crypto::short_hash(&name));

    let mut result = SearchResult::new(format!("tx_{id}"), name, SearchSource::Tianxing);
    result.category = non_empty(recipe.type_name);
    result.description = non_empty(recipe.texing).or_else(|| non_empty(recipe.tishi.clone()));
    result.steps = recipe.zuofa.as_deref().map(split_steps).unwrap_or_default();

    let mut ingredients = recipe
        .yuanliao
        .as_deref()
        .map(parse_ingredients)
        .unwrap_or_default();
    ingredients.extend(
        recipe
            .tiaoliao
            .as_deref()
            .map(parse_ingredients)
            .unwrap_or_default(),
    );
    result.ingredients = ingredients;

    if let Some(tips) = non_empty(recipe.tishi)
        && result.description.as_deref() != Some(tips.as_str())
    {
        result.steps.push(tips);
    }
    if let Some(category) = &result.category {
        result.tags.push(category.clone());
    }
    Some(result)
}

/// Tianxing recipe API client
pub struct TianxingAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    usage: Arc<DailyUsage>,
}

impl TianxingAdapter {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        usage: Arc<DailyUsage>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into(),
            usage,
        }
    }

    pub fn usage(&self) -> &DailyUsage {
        &self.usage
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>, AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AdapterError::MissingCredentials("tianxing"))?;
        if !self.usage.try_acquire() {
            return Err(AdapterError::DailyCapReached("tianxing"));
        }

        let num = TIANXING_RESULT_COUNT.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            [("key", api_key), ("word", keyword), ("num", num.as_str())],
        )
        .map_err(|e| AdapterError::InvalidResponse(format!("bad base URL: {e}")))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        let items = parse_tianxing(&body)?;
        tracing::debug!(%keyword, count = items.len(), "Tianxing search complete");
        Ok(items)
    }
}

#[async_trait]
impl SearchAdapter for TianxingAdapter {
    fn source(&self) -> SearchSource {
        SearchSource::Tianxing
    }

    async fn search(&self, keyword: &str) -> Vec<SearchResult> {
        absorb(SearchSource::Tianxing, keyword, self.fetch(keyword).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> String {
        json!({
            "code": 200,
            "msg": "success",
            "result": {
                "curpage": 1,
                "allnum": 2,
                "list": [
                    {
                        "id": 1021,
                        "type_id": 3,
                        "type_name": "川菜",
                        "cp_name": "麻婆豆腐",
                        "zuofa": "1.豆腐切块焯水。2.炒香肉末和豆瓣酱。3.下豆腐烧制勾芡。",
                        "texing": "麻辣鲜香",
                        "tishi": "豆腐焯水可去豆腥味",
                        "tiaoliao": "豆瓣酱:1勺,花椒粉:适量",
                        "yuanliao": "豆腐:1块,肉末:100g"
                    },
                    {"id": 1022, "cp_name": "", "zuofa": "x"}
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_success() {
        let items = parse_tianxing(&body()).unwrap();
        assert_eq!(items.len(), 1, "entries without a name are dropped");
        let item = &items[0];
        assert_eq!(item.id, "tx_1021");
        assert_eq!(item.name, "麻婆豆腐");
        assert_eq!(item.category.as_deref(), Some("川菜"));
        assert_eq!(item.description.as_deref(), Some("麻辣鲜香"));
        assert_eq!(item.ingredients.len(), 4);
        assert_eq!(item.ingredients[0].name, "豆腐");
        assert_eq!(item.ingredients[0].amount.as_deref(), Some("1块"));
        assert_eq!(item.steps.len(), 4, "three steps plus the tip");
        assert_eq!(item.tags, vec!["川菜"]);
    }

    #[test]
    fn test_parse_no_data() {
        let items = parse_tianxing(r#"{"code":250,"msg":"数据返回为空"}"#).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_upstream_error() {
        let err = parse_tianxing(r#"{"code":150,"msg":"API可用次数不足"}"#).unwrap_err();
        assert!(matches!(err, AdapterError::Upstream { code: 150, .. }));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_tianxing("<html>"),
            Err(AdapterError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_skips_upstream() {
        let usage = Arc::new(DailyUsage::new(None));
        let adapter = TianxingAdapter::new(
            reqwest::Client::new(),
            Some("  ".to_string()),
            "http://127.0.0.1:1/caipu",
            usage.clone(),
        );
        assert!(adapter.search("豆腐").await.is_empty());
        assert_eq!(usage.used_today(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_empty() {
        let adapter = TianxingAdapter::new(
            reqwest::Client::new(),
            Some("key".to_string()),
            "http://127.0.0.1:1/caipu",
            Arc::new(DailyUsage::new(None)),
        );
        assert!(adapter.search("豆腐").await.is_empty());
        assert_eq!(adapter.usage().used_today(), 1);
    }
}
