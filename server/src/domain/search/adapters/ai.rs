use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::text::{
    extract_json_array, ingredients_from_value, list_from_value, steps_from_value, value_text,
};
use super::{AdapterError, DailyUsage, SearchAdapter, absorb};
use crate::core::constants::AI_MAX_RESULTS;
use crate::domain::search::types::{SearchResult, SearchSource};
use crate::utils::crypto::short_hash;

const SYSTEM_PROMPT: &str = "You are a recipe assistant. Reply with a strict JSON array only, \
no prose and no code fences. Each element is an object with keys: \
name (string), type (string), prep_time (integer minutes), difficulty (string), \
description (string), ingredients (array of {name, amount}), steps (array of strings), \
tags (array of strings).";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn user_prompt(keyword: &str) -> String {
    format!(
        "Suggest up to {AI_MAX_RESULTS} home-cooking recipes for \"{keyword}\". \
         Use the same language as the request."
    )
}

/// Map a model reply into results.
///
/// The first JSON array found in the reply is used; elements that are not
/// objects or have no name are skipped.
pub fn parse_ai_reply(keyword: &str, content: &str) -> Result<Vec<SearchResult>, AdapterError> {
    let array = extract_json_array(content)
        .ok_or_else(|| AdapterError::InvalidResponse("no JSON array in model reply".into()))?;
    let values: Vec<Value> =
        serde_json::from_str(array).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

    Ok(values
        .iter()
        .filter_map(|v| to_result(keyword, v))
        .take(AI_MAX_RESULTS)
        .collect())
}

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| value.get(*n)).filter(|v| !v.is_null())
}

fn text_field(value: &Value, names: &[&str]) -> Option<String> {
    field(value, names).and_then(value_text)
}

/// Minutes from `30`, `"30"` or `"30分钟"`
fn parse_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|m| u32::try_from(m).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn to_result(keyword: &str, value: &Value) -> Option<SearchResult> {
    if !value.is_object() {
        return None;
    }
    let name = text_field(value, &["name", "title"])?;
    let id = format!("ai_{}", short_hash(format!("{keyword}\n{name}")));

    let mut result = SearchResult::new(id, name, SearchSource::Ai);
    result.category = text_field(value, &["type", "category"]);
    result.prep_time = field(value, &["prep_time", "time"]).and_then(parse_minutes);
    result.difficulty = text_field(value, &["difficulty"]);
    result.description = text_field(value, &["description", "desc"]);
    result.image_url = field(value, &["image_url"])
        .map(list_from_value)
        .unwrap_or_default();
    result.ingredients = field(value, &["ingredients"])
        .map(ingredients_from_value)
        .unwrap_or_default();
    result.steps = field(value, &["steps"]).map(steps_from_value).unwrap_or_default();
    result.tags = field(value, &["tags"]).map(list_from_value).unwrap_or_default();
    Some(result)
}

/// OpenAI-compatible chat completions client
pub struct AiAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    usage: Arc<DailyUsage>,
}

impl AiAdapter {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        usage: Arc<DailyUsage>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into(),
            model: model.into(),
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
            .ok_or(AdapterError::MissingCredentials("ai"))?;
        if !self.usage.try_acquire() {
            return Err(AdapterError::DailyCapReached("ai"));
        }

        let body = json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(keyword)},
            ],
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status(status.as_u16()));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdapterError::InvalidResponse("empty completion".into()))?;

        let items = parse_ai_reply(keyword, &content)?;
        tracing::debug!(%keyword, count = items.len(), model = %self.model, "AI search complete");
        Ok(items)
    }
}

#[async_trait]
impl SearchAdapter for AiAdapter {
    fn source(&self) -> SearchSource {
        SearchSource::Ai
    }

    async fn search(&self, keyword: &str) -> Vec<SearchResult> {
        absorb(SearchSource::Ai, keyword, self.fetch(keyword).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_wrapped_in_prose() {
        let reply = r#"好的，以下是推荐：
```json
[
  {"name": "红烧肉", "type": "家常菜", "prep_time": "90分钟", "difficulty": "中等",
   "ingredients": [{"name": "五花肉", "amount": "500g"}, "冰糖 30g"],
   "steps": ["1. 焯水", "2. 炒糖色", "3. 小火炖"], "tags": ["下饭"]},
  {"title": "可乐鸡翅", "prep_time": 30, "steps": "1.腌制。2.煎。3.加可乐收汁"},
  "not an object",
  {"type": "missing name"}
]
```
祝你用餐愉快！"#;
        let items = parse_ai_reply("肉", reply).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert!(first.id.starts_with("ai_"));
        assert_eq!(first.source, SearchSource::Ai);
        assert_eq!(first.prep_time, Some(90));
        assert_eq!(first.ingredients.len(), 2);
        assert_eq!(first.ingredients[1].amount.as_deref(), Some("30g"));
        assert_eq!(first.steps, vec!["焯水", "炒糖色", "小火炖"]);

        let second = &items[1];
        assert_eq!(second.name, "可乐鸡翅");
        assert_eq!(second.prep_time, Some(30));
        assert_eq!(second.steps.len(), 3);
    }

    #[test]
    fn test_ids_are_stable() {
        let reply = r#"[{"name": "番茄炒蛋"}]"#;
        let a = parse_ai_reply("番茄", reply).unwrap();
        let b = parse_ai_reply("番茄", reply).unwrap();
        let c = parse_ai_reply("鸡蛋", reply).unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].id, c[0].id);
    }

    #[test]
    fn test_repairs_mojibake_fields() {
        let reply = "[{\"name\": \"\u{e7}\u{ba}\u{a2}\u{e7}\u{192}\u{a7}\u{e8}\u{201a}\u{2030}\"}]";
        let items = parse_ai_reply("hongshaorou", reply).unwrap();
        assert_eq!(items[0].name, "红烧肉");
    }

    #[test]
    fn test_caps_result_count() {
        let reply: Vec<Value> = (0..10).map(|i| json!({"name": format!("dish {i}")})).collect();
        let items = parse_ai_reply("x", &Value::Array(reply).to_string()).unwrap();
        assert_eq!(items.len(), AI_MAX_RESULTS);
    }

    #[test]
    fn test_reply_without_array_is_invalid() {
        assert!(matches!(
            parse_ai_reply("x", "Sorry, I cannot help with that."),
            Err(AdapterError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_empty() {
        let adapter = AiAdapter::new(
            reqwest::Client::new(),
            None,
            "http://127.0.0.1:1/v1/chat/completions",
            "model",
            Arc::new(DailyUsage::new(None)),
        );
        assert!(adapter.search("番茄").await.is_empty());
        assert_eq!(adapter.usage().used_today(), 0);
    }

    #[tokio::test]
    async fn test_daily_cap_blocks_upstream() {
        let usage = Arc::new(DailyUsage::new(Some(1)));
        assert!(usage.try_acquire());
        let adapter = AiAdapter::new(
            reqwest::Client::new(),
            Some("sk-test".to_string()),
            "http://127.0.0.1:1/v1/chat/completions",
            "model",
            usage,
        );
        assert!(adapter.search("番茄").await.is_empty());
        assert_eq!(adapter.usage().used_today(), 1);
    }
}
