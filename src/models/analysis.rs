//! Result types returned by traversals and searches.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::workspace::CollectionKind;

/// An entity that transitively depends on the analyzed class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedEntity {
    pub name: String,
    pub kind: String,
    pub file_path: String,
    /// Hops from the dependent to the analyzed class.
    pub distance: i64,
}

/// One target reachable through outbound `USES` edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyLink {
    pub name: String,
    pub file_path: String,
    /// Length of the shortest path to this target.
    pub depth: i64,
}

/// A dependency cycle as an ordered name sequence, starting at its
/// lexicographically smallest member. The closing edge back to the first
/// member is implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyCycle {
    pub context: String,
    pub members: Vec<String>,
}

impl DependencyCycle {
    /// Builds a cycle from a traversal path.
    ///
    /// Accepts paths with or without the closing node repeated, removes
    /// immediate repeats and rotates to the smallest member so rotations of
    /// the same cycle compare equal. Paths visiting a member twice are two
    /// cycles joined at that member and yield `None`.
    pub fn normalized(context: impl Into<String>, mut path: Vec<String>) -> Option<Self> {
        if path.len() > 1 && path.first() == path.last() {
            path.pop();
        }
        path.dedup();
        if path.len() < 2 {
            return None;
        }
        let mut seen = HashSet::with_capacity(path.len());
        if !path.iter().all(|name| seen.insert(name.as_str())) {
            return None;
        }

        let start = path
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        path.rotate_left(start);

        Some(Self {
            context: context.into(),
            members: path,
        })
    }
}

/// A semantic search hit from one of the workspace's collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub collection: CollectionKind,
    pub payload: Map<String, JsonValue>,
}

impl SearchHit {
    pub fn name(&self) -> Option<&str> {
        self.payload.get("name").and_then(JsonValue::as_str)
    }
}

/// A full-text match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub name: String,
    pub kind: String,
    pub file_path: String,
    pub context: String,
    /// Lucene relevance; `None` when answered by the substring fallback.
    pub score: Option<f64>,
}
