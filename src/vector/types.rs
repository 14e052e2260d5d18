//! Wire types for the vector store's REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::models::CollectionKind;

/// A point to upsert: one per entity with an embedding.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub kind: CollectionKind,
    pub vector: Vec<f32>,
    pub payload: Map<String, JsonValue>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PointBody<'a> {
    pub id: &'a Uuid,
    pub vector: &'a [f32],
    pub payload: &'a Map<String, JsonValue>,
}

/// Standard response envelope: `{"result": ..., "status": "ok", "time": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub result: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoredPoint {
    pub id: JsonValue,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScrollPage {
    pub points: Vec<Record>,
    #[serde(default)]
    pub next_page_offset: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Record {
    #[serde(default)]
    pub payload: Option<Map<String, JsonValue>>,
}

/// Point ids are UUIDs or unsigned integers; both are reported as text.
pub(crate) fn id_to_string(id: &JsonValue) -> String {
    match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
