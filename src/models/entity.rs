//! Code entities ("memories") and their store representations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::value::Metadata;
use super::workspace::{CollectionKind, Workspace};

/// Namespace for deterministic point and pattern ids.
const ID_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Payload and property keys owned by the core fields. Metadata keys that
/// collide with these are dropped.
pub const CORE_KEYS: &[&str] = &[
    "name",
    "kind",
    "content",
    "summary",
    "file_path",
    "line_number",
    "context",
    "indexed_at",
    "id",
    "pattern_type",
    "category",
    "implementation",
    "confidence",
    "best_practice",
    "reference_url",
    "is_positive",
    "detected_at",
];

/// Source-level entity kinds.
///
/// `Enum`, `Test` and `Controller` are stored Class-shaped and `Endpoint`
/// Method-shaped; the original kind survives in the `kind` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Class,
    Method,
    Property,
    Interface,
    Pattern,
    Enum,
    Test,
    Controller,
    Endpoint,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::File,
        EntityKind::Class,
        EntityKind::Method,
        EntityKind::Property,
        EntityKind::Interface,
        EntityKind::Pattern,
        EntityKind::Enum,
        EntityKind::Test,
        EntityKind::Controller,
        EntityKind::Endpoint,
    ];

    /// Graph label the kind is stored under.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::File => "File",
            EntityKind::Class | EntityKind::Enum | EntityKind::Test | EntityKind::Controller => {
                "Class"
            }
            EntityKind::Method | EntityKind::Endpoint => "Method",
            EntityKind::Property => "Property",
            EntityKind::Interface => "Interface",
            EntityKind::Pattern => "Pattern",
        }
    }

    /// Vector collection the kind is stored in.
    pub fn collection_kind(&self) -> CollectionKind {
        match self.label() {
            "File" => CollectionKind::Files,
            "Method" | "Property" => CollectionKind::Methods,
            "Pattern" => CollectionKind::Patterns,
            _ => CollectionKind::Classes,
        }
    }

    /// Merged kinds are upserted in place; the rest are created fresh on
    /// every write.
    pub fn is_merged(&self) -> bool {
        !matches!(self.label(), "Method" | "Property")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Class => "class",
            EntityKind::Method => "method",
            EntityKind::Property => "property",
            EntityKind::Interface => "interface",
            EntityKind::Pattern => "pattern",
            EntityKind::Enum => "enum",
            EntityKind::Test => "test",
            EntityKind::Controller => "controller",
            EntityKind::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("Invalid entity kind '{}'", s))
    }
}

/// Fields specific to detected patterns and anti-patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetails {
    /// Merge key of the Pattern node.
    pub id: String,
    pub pattern_type: String,
    pub category: String,
    #[serde(default)]
    pub implementation: String,
    /// Detection confidence in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default)]
    pub best_practice: Option<String>,
    #[serde(default)]
    pub reference_url: Option<String>,
    /// `false` marks an anti-pattern.
    pub is_positive: bool,
    pub detected_at: DateTime<Utc>,
}

/// One extracted unit of code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeMemory {
    pub kind: EntityKind,
    pub name: String,
    pub content: String,
    pub summary: Option<String>,
    pub file_path: String,
    pub line_number: i64,
    pub context: Workspace,
    pub metadata: Metadata,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub indexed_at: DateTime<Utc>,
    pub pattern: Option<PatternDetails>,
}

impl CodeMemory {
    pub fn new(context: Workspace, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: String::new(),
            summary: None,
            file_path: String::new(),
            line_number: 0,
            context,
            metadata: Metadata::new(),
            embedding: None,
            indexed_at: Utc::now(),
            pattern: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn at(mut self, file_path: impl Into<String>, line_number: i64) -> Self {
        self.file_path = file_path.into();
        self.line_number = line_number;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attaches pattern fields, clamping confidence into `0.0..=1.0`.
    pub fn with_pattern(mut self, mut pattern: PatternDetails) -> Self {
        if !(0.0..=1.0).contains(&pattern.confidence) {
            tracing::debug!(
                pattern = %self.name,
                confidence = pattern.confidence,
                "Clamping pattern confidence"
            );
            pattern.confidence = if pattern.confidence.is_nan() {
                0.0
            } else {
                pattern.confidence.clamp(0.0, 1.0)
            };
        }
        self.pattern = Some(pattern);
        self
    }

    /// Stable id of this entity's vector point.
    ///
    /// Follows the graph's identity: merged kinds key on their merge key, so
    /// a class that moves within its file still owns a single point. Appended
    /// kinds also key on their location.
    pub fn point_id(&self) -> Uuid {
        let key = match (&self.pattern, self.kind) {
            (Some(pattern), EntityKind::Pattern) => {
                format!("codevault://{}/Pattern/{}", self.context, pattern.id)
            }
            (_, kind) if kind.is_merged() => {
                format!("codevault://{}/{}/{}", self.context, kind.label(), self.name)
            }
            (_, kind) => format!(
                "codevault://{}/{}/{}/{}#{}",
                self.context,
                kind.label(),
                self.file_path,
                self.name,
                self.line_number
            ),
        };
        Uuid::new_v5(&ID_NAMESPACE, key.as_bytes())
    }

    /// Text sent to the embedding endpoint when no embedding was supplied.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{} {}", self.kind, self.name);
        if let Some(summary) = &self.summary {
            text.push('\n');
            text.push_str(summary);
        }
        if !self.content.is_empty() {
            text.push('\n');
            text.push_str(&self.content);
        }
        text
    }

    /// Flat property map: core fields followed by metadata.
    ///
    /// Used both as graph node properties and as vector point payload.
    pub fn properties(&self) -> Map<String, JsonValue> {
        let mut props = Map::new();
        props.insert("name".into(), self.name.clone().into());
        props.insert("kind".into(), self.kind.as_str().into());
        props.insert("content".into(), self.content.clone().into());
        if let Some(summary) = &self.summary {
            props.insert("summary".into(), summary.clone().into());
        }
        props.insert("file_path".into(), self.file_path.clone().into());
        props.insert("line_number".into(), self.line_number.into());
        props.insert("context".into(), self.context.as_str().into());
        props.insert("indexed_at".into(), self.indexed_at.to_rfc3339().into());

        if let Some(pattern) = &self.pattern {
            props.insert("id".into(), pattern.id.clone().into());
            props.insert("pattern_type".into(), pattern.pattern_type.clone().into());
            props.insert("category".into(), pattern.category.clone().into());
            props.insert("implementation".into(), pattern.implementation.clone().into());
            props.insert("confidence".into(), pattern.confidence.into());
            if let Some(text) = &pattern.best_practice {
                props.insert("best_practice".into(), text.clone().into());
            }
            if let Some(url) = &pattern.reference_url {
                props.insert("reference_url".into(), url.clone().into());
            }
            props.insert("is_positive".into(), pattern.is_positive.into());
            props.insert("detected_at".into(), pattern.detected_at.to_rfc3339().into());
        }

        for (key, value) in &self.metadata {
            if CORE_KEYS.contains(&key.as_str()) {
                tracing::debug!(key = %key, entity = %self.name, "Skipping metadata key shadowing a core field");
                continue;
            }
            props.insert(key.clone(), value.to_json());
        }

        props
    }
}

/// Default Pattern id: deterministic over workspace, location and name.
pub fn pattern_id(context: &Workspace, file_path: &str, name: &str, line_number: i64) -> String {
    let key = format!("pattern://{}/{}/{}#{}", context, file_path, name, line_number);
    Uuid::new_v5(&ID_NAMESPACE, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::MetaValue;

    fn demo() -> Workspace {
        Workspace::new("demo").unwrap()
    }

    fn pattern(confidence: f64) -> PatternDetails {
        PatternDetails {
            id: pattern_id(&demo(), "src/repo.rs", "Repository", 3),
            pattern_type: "repository".into(),
            category: "architecture".into(),
            implementation: String::new(),
            confidence,
            best_practice: None,
            reference_url: None,
            is_positive: true,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn source_kinds_map_onto_storage_shapes() {
        assert_eq!(EntityKind::Enum.label(), "Class");
        assert_eq!(EntityKind::Controller.collection_kind(), CollectionKind::Classes);
        assert_eq!(EntityKind::Endpoint.label(), "Method");
        assert_eq!(EntityKind::Property.collection_kind(), CollectionKind::Methods);
        assert_eq!(EntityKind::Pattern.collection_kind(), CollectionKind::Patterns);
        assert_eq!(EntityKind::File.collection_kind(), CollectionKind::Files);
    }

    #[test]
    fn merge_semantics_by_shape() {
        assert!(EntityKind::Class.is_merged());
        assert!(EntityKind::Test.is_merged());
        assert!(EntityKind::Pattern.is_merged());
        assert!(!EntityKind::Method.is_merged());
        assert!(!EntityKind::Endpoint.is_merged());
        assert!(!EntityKind::Property.is_merged());
    }

    #[test]
    fn point_ids_are_deterministic() {
        let a = CodeMemory::new(demo(), EntityKind::Class, "Foo").at("src/foo.rs", 1);
        let b = CodeMemory::new(demo(), EntityKind::Class, "Foo").at("src/foo.rs", 1);
        let other_ws = CodeMemory::new(Workspace::new("other").unwrap(), EntityKind::Class, "Foo")
            .at("src/foo.rs", 1);

        assert_eq!(a.point_id(), b.point_id());
        assert_ne!(a.point_id(), other_ws.point_id());
    }

    #[test]
    fn merged_kinds_keep_one_point_when_moved() {
        let before = CodeMemory::new(demo(), EntityKind::Class, "Foo").at("src/foo.rs", 1);
        let after = CodeMemory::new(demo(), EntityKind::Class, "Foo").at("src/foo.rs", 5);
        let as_enum = CodeMemory::new(demo(), EntityKind::Enum, "Foo").at("src/foo.rs", 9);
        assert_eq!(before.point_id(), after.point_id());
        assert_eq!(before.point_id(), as_enum.point_id());

        let interface = CodeMemory::new(demo(), EntityKind::Interface, "Foo").at("src/foo.rs", 1);
        assert_ne!(before.point_id(), interface.point_id());
    }

    #[test]
    fn appended_kinds_key_on_location() {
        let first = CodeMemory::new(demo(), EntityKind::Method, "run").at("src/job.rs", 10);
        let moved = CodeMemory::new(demo(), EntityKind::Method, "run").at("src/job.rs", 20);
        assert_ne!(first.point_id(), moved.point_id());
    }

    #[test]
    fn patterns_key_on_pattern_id() {
        let a = CodeMemory::new(demo(), EntityKind::Pattern, "Repository")
            .at("src/repo.rs", 3)
            .with_pattern(pattern(0.9));
        let b = CodeMemory::new(demo(), EntityKind::Pattern, "Repository (renamed)")
            .at("src/other.rs", 40)
            .with_pattern(pattern(0.5));
        assert_eq!(a.point_id(), b.point_id());
    }

    #[test]
    fn confidence_is_clamped() {
        let high = CodeMemory::new(demo(), EntityKind::Pattern, "Repository").with_pattern(pattern(1.7));
        let low = CodeMemory::new(demo(), EntityKind::Pattern, "Repository").with_pattern(pattern(-0.2));

        assert_eq!(high.pattern.unwrap().confidence, 1.0);
        assert_eq!(low.pattern.unwrap().confidence, 0.0);
    }

    #[test]
    fn metadata_cannot_shadow_core_fields() {
        let mut memory = CodeMemory::new(demo(), EntityKind::Class, "Foo").at("src/foo.rs", 4);
        memory.metadata.insert("context".into(), MetaValue::from("other"));
        memory.metadata.insert("is_abstract".into(), MetaValue::Bool(true));

        let props = memory.properties();
        assert_eq!(props["context"], "demo");
        assert_eq!(props["is_abstract"], true);
        assert_eq!(props["kind"], "class");
        assert_eq!(props["line_number"], 4);
    }

    #[test]
    fn embedding_text_includes_kind_and_content() {
        let memory = CodeMemory::new(demo(), EntityKind::Method, "save").with_content("fn save(&self)");
        assert_eq!(memory.embedding_text(), "method save\nfn save(&self)");
    }
}
