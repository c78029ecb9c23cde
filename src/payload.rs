//! Accessors for loosely-typed upstream JSON.
//!
//! Congress.gov mixes numbers and numeric strings, and nests collections
//! either as a bare array or as `{"item": [...]}`.

use serde_json::Value;

/// Non-empty string at `key`, with numbers rendered as text.
pub fn string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer at `key`, accepting `42` and `"42"`.
pub fn int(value: &Value, key: &str) -> Option<i64> {
    as_int(value.get(key)?)
}

pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String at a nested path, e.g. `["latestAction", "text"]`.
pub fn path_string(value: &Value, path: &[&str]) -> Option<String> {
    let (last, parents) = path.split_last()?;
    let mut cur = value;
    for key in parents {
        cur = cur.get(*key)?;
    }
    string(cur, last)
}

/// Elements of a collection that may be a bare array or `{"item": [...]}`.
/// A single `{"item": {...}}` object yields one element.
pub fn items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(Value::Object(map)) => match map.get("item") {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// The `url` of a sub-resource reference like `"actions": {"count": 3, "url": "..."}`.
pub fn link(value: &Value, key: &str) -> Option<String> {
    path_string(value, &[key, "url"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_and_int_accept_mixed_types() {
        let v = json!({"congress": "118", "number": 42, "blank": "  "});
        assert_eq!(int(&v, "congress"), Some(118));
        assert_eq!(string(&v, "number").as_deref(), Some("42"));
        assert_eq!(string(&v, "blank"), None);
        assert_eq!(int(&v, "missing"), None);
    }

    #[test]
    fn items_handles_both_collection_shapes() {
        let wrapped = json!({"item": [{"a": 1}, {"a": 2}]});
        let bare = json!([{"a": 1}]);
        let single = json!({"item": {"a": 1}});
        assert_eq!(items(Some(&wrapped)).len(), 2);
        assert_eq!(items(Some(&bare)).len(), 1);
        assert_eq!(items(Some(&single)).len(), 1);
        assert!(items(None).is_empty());
        assert!(items(Some(&json!({}))).is_empty());
        // a sub-resource link is not a collection
        assert!(items(Some(&json!({"count": 2, "url": "https://x"}))).is_empty());
    }

    #[test]
    fn nested_path() {
        let v = json!({"latestAction": {"text": "Referred to committee"}});
        assert_eq!(
            path_string(&v, &["latestAction", "text"]).as_deref(),
            Some("Referred to committee")
        );
        assert_eq!(path_string(&v, &["latestAction", "actionDate"]), None);
    }
}
