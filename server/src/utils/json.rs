//! JSON helpers

use serde_json::Value;

/// Serialize a JSON value with object keys sorted recursively.
///
/// `serde_json` is built with `preserve_order`, so two semantically equal
/// objects can otherwise serialize differently depending on insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical form of a raw request body.
///
/// Bodies that parse as JSON are canonicalized; anything else is used verbatim.
pub fn canonical_body(body: &[u8]) -> Vec<u8> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => canonical_json(&value).into_bytes(),
        Err(_) => body.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": true, "x": [3, {"d": null, "c": "z"}]}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"x":[3,{"c":"z","d":null}],"y":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_insertion_order_independent() {
        let a: Value = serde_json::from_str(r#"{"query":"鱼","tier":"pro"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"tier":"pro","query":"鱼"}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let v = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonical_json(&v), r#"{"k\"ey":"line\nbreak"}"#);
    }

    #[test]
    fn test_canonical_body_whitespace_insensitive() {
        let a = canonical_body(br#"{ "query" : "tofu",  "force_refresh": false }"#);
        let b = canonical_body(br#"{"force_refresh":false,"query":"tofu"}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_body_non_json_passthrough() {
        assert_eq!(canonical_body(b"not json"), b"not json".to_vec());
    }
}
