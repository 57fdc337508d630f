//! Text normalization shared by the adapters
//!
//! Upstream recipe text arrives in several shapes: JSON arrays, delimited
//! strings, numbered paragraphs, and (from some AI providers) UTF-8 that was
//! decoded as Latin-1/cp1252 somewhere along the way.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::super::types::Ingredient;

const LIST_SEPARATORS: &[char] = &[',', '，', '、', ';', '；', '\n'];
const INVISIBLE: &[char] = &['\u{FFFD}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Split a delimited or JSON-array string into trimmed, non-empty items
pub fn split_list(text: &str) -> Vec<String> {
    if let Some(items) = json_string_array(text) {
        return items;
    }
    text.split(LIST_SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split cooking instructions into steps, dropping `1.` / `2、` markers
pub fn split_steps(text: &str) -> Vec<String> {
    if let Some(items) = json_string_array(text) {
        return items
            .iter()
            .map(|s| strip_step_marker(s).to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        return lines
            .into_iter()
            .map(|l| strip_step_marker(l).to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let text = text.trim();
    let starts = step_marker_starts(text);
    if starts.len() < 2 {
        let single = strip_step_marker(text);
        return if single.is_empty() {
            Vec::new()
        } else {
            vec![single.to_string()]
        };
    }

    let mut steps = Vec::with_capacity(starts.len());
    let mut bounds = starts.clone();
    bounds.push(text.len());
    // Anything before the first marker is a preamble step
    if starts[0] > 0 {
        bounds.insert(0, 0);
    }
    for window in bounds.windows(2) {
        let step = strip_step_marker(text[window[0]..window[1]].trim());
        if !step.is_empty() {
            steps.push(step.to_string());
        }
    }
    steps
}

/// Numbered step marker at the start of the text or after whitespace or a
/// sentence end, not followed by another digit (so `1.5` stays intact)
fn step_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s。；;！!])(\d+[.、．)）])(?:[^\d]|$)").expect("Invalid regex")
    })
}

/// Byte offsets where a numbered step marker starts
fn step_marker_starts(text: &str) -> Vec<usize> {
    step_marker_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.start())
        .collect()
}

fn strip_step_marker(step: &str) -> &str {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d+[.、．)）]\s*").expect("Invalid regex"));
    let step = step.trim();
    match re.find(step) {
        Some(m) if !step[m.end()..].starts_with(|c: char| c.is_ascii_digit()) => &step[m.end()..],
        _ => step,
    }
}

/// Parse an ingredient list (JSON or delimited text)
pub fn parse_ingredients(text: &str) -> Vec<Ingredient> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        return items.iter().filter_map(ingredient_from_value).collect();
    }
    split_list(text).iter().map(|s| split_ingredient(s)).collect()
}

/// Ingredient from a JSON string or `{name, amount}` object
pub fn ingredient_from_value(value: &Value) -> Option<Ingredient> {
    match value {
        Value::String(s) => {
            let s = repair_text(s);
            (!s.is_empty()).then(|| split_ingredient(&s))
        }
        Value::Object(map) => {
            let name = map.get("name").and_then(value_text)?;
            let amount = map
                .get("amount")
                .or_else(|| map.get("quantity"))
                .and_then(value_text);
            Some(Ingredient { name, amount })
        }
        _ => None,
    }
}

/// `猪肉:500g`, `猪肉 500g` or just `盐`
pub fn split_ingredient(item: &str) -> Ingredient {
    let item = item.trim();
    if let Some((name, amount)) = item.split_once([':', '：']) {
        let amount = amount.trim();
        return Ingredient {
            name: name.trim().to_string(),
            amount: (!amount.is_empty()).then(|| amount.to_string()),
        };
    }
    if let Some((name, amount)) = item.rsplit_once(char::is_whitespace)
        && amount.chars().any(|c| c.is_ascii_digit())
        && !name.trim().is_empty()
    {
        return Ingredient {
            name: name.trim().to_string(),
            amount: Some(amount.to_string()),
        };
    }
    Ingredient {
        name: item.to_string(),
        amount: None,
    }
}

/// Steps from a JSON array or a single instruction string
pub fn steps_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .map(|s| strip_step_marker(&s).to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_steps(&repair_text(s)),
        _ => Vec::new(),
    }
}

/// Ingredients from a JSON array or a delimited string
pub fn ingredients_from_value(value: &Value) -> Vec<Ingredient> {
    match value {
        Value::Array(items) => items.iter().filter_map(ingredient_from_value).collect(),
        Value::String(s) => parse_ingredients(&repair_text(s)),
        _ => Vec::new(),
    }
}

/// Plain strings from a JSON array or a delimited string
pub fn list_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        Value::String(s) => split_list(&repair_text(s)),
        _ => Vec::new(),
    }
}

/// Repaired, trimmed text from a JSON string or number
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => repair_text(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_string_array(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    let values: Vec<Value> = serde_json::from_str(trimmed).ok()?;
    Some(values.iter().filter_map(value_text).collect())
}

/// First balanced JSON array embedded in free text (AI replies often wrap
/// the payload in prose or code fences)
pub fn extract_json_array(text: &str) -> Option<&str> {
    for (start, _) in text.match_indices('[') {
        if let Some(end) = matching_bracket(&text[start..]) {
            let candidate = &text[start..start + end];
            if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Array(_))) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Length of the bracketed region starting at `text[0] == '['`
fn matching_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip invisible characters and undo Latin-1/cp1252 mojibake
pub fn repair_text(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| !INVISIBLE.contains(c)).collect();
    let cleaned = cleaned.trim();
    match undo_mojibake(cleaned) {
        Some(fixed) => fixed,
        None => cleaned.to_string(),
    }
}

/// Re-encode as cp1252 bytes and decode as UTF-8; `None` when the text is
/// not mojibake (plain ASCII, real non-Latin text, or invalid result)
fn undo_mojibake(text: &str) -> Option<String> {
    if text.is_ascii() {
        return None;
    }
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        let byte = match u8::try_from(code) {
            Ok(b) => b,
            Err(_) => cp1252_byte(c)?,
        };
        bytes.push(byte);
    }
    String::from_utf8(bytes).ok().filter(|fixed| fixed != text)
}

/// cp1252 byte for the characters it maps into 0x80..=0x9F
fn cp1252_byte(c: char) -> Option<u8> {
    Some(match c {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    })
}
