//! Closed value type for entity metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A metadata value: the only shapes that reach store payloads or query
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

/// Kind-specific facts about an entity (`is_abstract`, `cyclomatic_complexity`, ...).
pub type Metadata = BTreeMap<String, MetaValue>;

impl MetaValue {
    /// Converts arbitrary JSON into a metadata value.
    ///
    /// Arrays and objects have no metadata shape; they are kept as their
    /// JSON text.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => MetaValue::Null,
            JsonValue::Bool(b) => MetaValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Int(i),
                None => MetaValue::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => MetaValue::String(s),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                tracing::debug!("Flattening nested metadata value to JSON text");
                MetaValue::String(nested.to_string())
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            MetaValue::Bool(b) => JsonValue::Bool(*b),
            MetaValue::Int(i) => JsonValue::from(*i),
            // NaN and infinities have no JSON form
            MetaValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            MetaValue::String(s) => JsonValue::String(s.clone()),
            MetaValue::Null => JsonValue::Null,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

/// Builds metadata from a JSON object; any other JSON yields empty metadata.
pub fn metadata_from_json(value: JsonValue) -> Metadata {
    match value {
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, MetaValue::from_json(v)))
            .collect(),
        JsonValue::Null => Metadata::new(),
        other => {
            tracing::debug!(kind = json_kind(&other), "Ignoring non-object metadata");
            Metadata::new()
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
