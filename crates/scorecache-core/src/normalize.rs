//! Normalization of raw origin payloads into the canonical result types.
//!
//! The upstream provider omits fields, sends `null` where a list is
//! expected, and wraps payloads inconsistently. Each canonical result type
//! has exactly one `Normalize` implementation; after it runs, downstream code
//! never needs to check whether a sequence field is really a sequence.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::matches::{MatchAnalysis, MatchCount, MatchDetail, MatchList, MatchSummary};

/// Conversion from a raw origin payload into a canonical result type.
pub trait Normalize: Sized {
    fn normalize(raw: Value) -> Result<Self>;
}

impl Normalize for MatchList {
    fn normalize(raw: Value) -> Result<Self> {
        let (items, declared_total) = match raw {
            Value::Array(items) => (items, None),
            Value::Object(mut obj) => {
                let items = ["matches", "data", "response"]
                    .iter()
                    .find_map(|field| match obj.remove(*field) {
                        Some(Value::Array(items)) => Some(items),
                        _ => None,
                    })
                    .unwrap_or_default();
                let total = obj.get("total").and_then(count_of);
                (items, total)
            }
            Value::Null => (Vec::new(), None),
            other => {
                return Err(CoreError::invalid_payload(format!(
                    "expected match list, got {}",
                    value_kind(&other)
                )));
            }
        };

        let matches: Vec<MatchSummary> = items.into_iter().filter_map(summary_from).collect();
        let total = declared_total.unwrap_or(matches.len() as u64);

        Ok(MatchList {
            matches,
            total,
            degraded: false,
        })
    }
}

impl Normalize for MatchDetail {
    fn normalize(raw: Value) -> Result<Self> {
        let obj = unwrap_object(raw, "match detail")?;
        Ok(serde_json::from_value(obj)?)
    }
}

impl Normalize for MatchAnalysis {
    fn normalize(raw: Value) -> Result<Self> {
        let obj = unwrap_object(raw, "match analysis")?;
        Ok(serde_json::from_value(obj)?)
    }
}

impl Normalize for MatchCount {
    fn normalize(raw: Value) -> Result<Self> {
        match raw {
            Value::Number(_) | Value::String(_) => Ok(MatchCount {
                total: count_of(&raw).unwrap_or(0),
                ..MatchCount::default()
            }),
            Value::Object(_) => {
                let obj = unwrap_object(raw, "match count")?;
                Ok(serde_json::from_value(obj)?)
            }
            other => Err(CoreError::invalid_payload(format!(
                "expected match count, got {}",
                value_kind(&other)
            ))),
        }
    }
}

/// Accepts `{...}` or `{"data": {...}}`.
fn unwrap_object(raw: Value, what: &str) -> Result<Value> {
    match raw {
        Value::Object(mut obj) => {
            if obj.len() == 1 && matches!(obj.get("data"), Some(Value::Object(_))) {
                if let Some(inner) = obj.remove("data") {
                    return Ok(inner);
                }
            }
            Ok(Value::Object(obj))
        }
        other => Err(CoreError::invalid_payload(format!(
            "expected {what} object, got {}",
            value_kind(&other)
        ))),
    }
}

fn summary_from(item: Value) -> Option<MatchSummary> {
    if item.is_object() {
        serde_json::from_value(item).ok()
    } else {
        None
    }
}

fn count_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Field-level helpers used through `deserialize_with`.

pub(crate) fn seq_or_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

pub(crate) fn match_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<MatchSummary>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items.into_iter().filter_map(summary_from).collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

pub(crate) fn optional_text<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Object(obj)) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

pub(crate) fn count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(count_of)
        .unwrap_or(0))
}
