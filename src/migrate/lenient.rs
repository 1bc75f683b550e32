//! Forgiving field decoders for stored records.
//!
//! Old dashboards saved some text fields as numbers, and some as `null`.
//! These helpers read such values instead of rejecting the whole record.

use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Scalar rendered as text. Objects and lists have no text form.
fn scalar_text(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) => Err("expected text, found a list".to_string()),
        Value::Object(_) => Err("expected text, found an object".to_string()),
    }
}

/// Text from a string, number or bool.
pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    scalar_text(Value::deserialize(d)?).map_err(D::Error::custom)
}

/// Like [`text`], with `null` read as an empty string.
pub fn text_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(opt_text(d)?.unwrap_or_default())
}

/// Optional text from a string, number or bool; `null` is `None`.
pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None => Ok(None),
        Some(value) => scalar_text(value).map(Some).map_err(D::Error::custom),
    }
}

/// Optional list of text; members may be numbers.
pub fn opt_text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    match Option::<Vec<Value>>::deserialize(d)? {
        None => Ok(None),
        Some(items) => items
            .into_iter()
            .map(scalar_text)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(D::Error::custom),
    }
}

/// Optional list of milliseconds; members may be numeric strings.
pub fn opt_ms_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u64>>, D::Error> {
    let items = match Option::<Vec<Value>>::deserialize(d)? {
        None => return Ok(None),
        Some(items) => items,
    };
    items
        .into_iter()
        .map(|item| match &item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| D::Error::custom(format!("'{}' is not a millisecond count", item))))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "text_or_default")]
        name: String,
        #[serde(default, deserialize_with = "opt_text")]
        count: Option<String>,
        #[serde(default, deserialize_with = "opt_text_list")]
        tags: Option<Vec<String>>,
        #[serde(default, deserialize_with = "opt_ms_list")]
        grains: Option<Vec<u64>>,
    }

    fn sample(value: Value) -> Result<Sample, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_null_and_missing_read_as_default() {
        let s = sample(json!({ "name": null, "count": null })).unwrap();
        assert_eq!(s.name, "");
        assert!(s.count.is_none());

        let s = sample(json!({})).unwrap();
        assert_eq!(s.name, "");
        assert!(s.tags.is_none());
    }

    #[test]
    fn test_numbers_read_as_text() {
        let s = sample(json!({ "name": 7, "count": 5, "tags": ["a", 2, true] })).unwrap();
        assert_eq!(s.name, "7");
        assert_eq!(s.count.as_deref(), Some("5"));
        assert_eq!(s.tags, Some(vec!["a".to_string(), "2".to_string(), "true".to_string()]));
    }

    #[test]
    fn test_ms_list_accepts_numeric_strings() {
        let s = sample(json!({ "grains": [60000, "300000"] })).unwrap();
        assert_eq!(s.grains, Some(vec![60_000, 300_000]));
        assert!(sample(json!({ "grains": ["soon"] })).is_err());
    }

    #[test]
    fn test_structured_values_are_not_text() {
        assert!(sample(json!({ "count": { "n": 5 } })).is_err());
        assert!(sample(json!({ "name": [1] })).is_err());
    }
}
