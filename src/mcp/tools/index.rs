//! Indexing tools: store extracted entities, delete files.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::di::FromContext;
use crate::error::AppError;
use crate::mcp::dispatcher::ToolProvider;
use crate::mcp::protocol::{mark_error, render, tool_error, ToolDefinition};
use crate::models::{
    metadata_from_json, pattern_id, CodeMemory, EntityKind, PatternDetails, Relationship,
    RelationshipType, Workspace,
};
use crate::services::{IndexBatch, IndexingService};

use super::{parse_args, unknown_tool};

/// One extracted entity.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryInput {
    /// file, class, method, property, interface, pattern, enum, test,
    /// controller or endpoint.
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub line_number: i64,
    /// Flat key/value facts (booleans, numbers, strings).
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
    /// Precomputed embedding; must match the configured dimensions.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Required when kind is `pattern`.
    #[serde(default)]
    pub pattern: Option<PatternInput>,
}

/// Pattern-specific fields.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PatternInput {
    /// Stable id; derived from workspace, file, name and line when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub pattern_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub implementation: String,
    /// 0.0 to 1.0; out-of-range values are clamped.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub best_practice: Option<String>,
    #[serde(default)]
    pub reference_url: Option<String>,
    /// `false` marks an anti-pattern (default: true).
    #[serde(default = "default_true")]
    pub is_positive: bool,
    /// RFC 3339 timestamp (default: now).
    #[serde(default)]
    pub detected_at: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One directed edge between named entities.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelationshipInput {
    pub from: String,
    pub to: String,
    /// INHERITS, IMPLEMENTS, USES, CALLS, DEFINES, IMPORTS, FOLLOWS_PATTERN,
    /// CONTAINS_PATTERN, HAS_TASK or DEPENDS_ON.
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: HashMap<String, JsonValue>,
}

/// Parameters for store_memories tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StoreMemoriesParams {
    pub context: String,
    pub memories: Vec<MemoryInput>,
    #[serde(default)]
    pub relationships: Vec<RelationshipInput>,
    /// Embed entities that arrive without an embedding (default: false).
    #[serde(default)]
    pub generate_embeddings: bool,
}

/// Parameters for delete_file tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteFileParams {
    pub context: String,
    pub file_path: String,
}

#[derive(FromContext, Clone)]
pub struct IndexTools {
    indexing: IndexingService,
}

#[async_trait]
impl ToolProvider for IndexTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new::<StoreMemoriesParams>(
                "store_memories",
                "Write extracted entities and relationships to the graph and vector stores. \
                 Files, classes, interfaces and patterns are merged by name; methods and \
                 properties are appended, so delete a file before re-indexing it.",
            ),
            ToolDefinition::new::<DeleteFileParams>(
                "delete_file",
                "Remove every entity of a file from both stores.",
            ),
        ]
    }

    async fn call(
        &self,
        name: &str,
        arguments: Map<String, JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, AppError> {
        match name {
            "store_memories" => {
                let params: StoreMemoriesParams = parse_args(name, arguments)?;
                let batch = build_batch(params)?;
                let report = self.indexing.index(batch, cancel).await?;
                let result = render(&report, None)?;
                Ok(if report.is_complete() {
                    result
                } else {
                    mark_error(result)
                })
            }
            "delete_file" => {
                let params: DeleteFileParams = parse_args(name, arguments)?;
                let workspace = Workspace::new(&params.context)?;
                let report = self
                    .indexing
                    .delete_file(&workspace, &params.file_path, cancel)
                    .await?;
                let result = render(&report, None)?;
                Ok(if report.is_complete() {
                    result
                } else {
                    mark_error(result)
                })
            }
            _ => Ok(tool_error(unknown_tool("index tools", name).to_string())),
        }
    }
}

fn build_batch(params: StoreMemoriesParams) -> Result<IndexBatch, AppError> {
    let workspace = Workspace::new(&params.context)?;

    let memories = params
        .memories
        .into_iter()
        .map(|input| build_memory(&workspace, input))
        .collect::<Result<Vec<_>, _>>()?;

    let relationships = params
        .relationships
        .into_iter()
        .map(build_relationship)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IndexBatch {
        workspace,
        memories,
        relationships,
        generate_embeddings: params.generate_embeddings,
    })
}

fn build_memory(workspace: &Workspace, input: MemoryInput) -> Result<CodeMemory, AppError> {
    let kind: EntityKind = input.kind.parse().map_err(AppError::InvalidParams)?;
    if input.name.trim().is_empty() {
        return Err(AppError::InvalidParams(format!("{} entity has an empty name", kind)));
    }

    let mut memory = CodeMemory::new(workspace.clone(), kind, input.name)
        .with_content(input.content)
        .at(input.file_path, input.line_number);
    memory.summary = input.summary;
    memory.metadata = metadata_from_json(JsonValue::Object(input.metadata.into_iter().collect()));
    memory.embedding = input.embedding;

    match (kind, input.pattern) {
        (EntityKind::Pattern, Some(pattern)) => {
            let details = build_pattern(workspace, &memory, pattern)?;
            Ok(memory.with_pattern(details))
        }
        (EntityKind::Pattern, None) => Err(AppError::InvalidParams(format!(
            "pattern '{}' is missing its pattern fields",
            memory.name
        ))),
        (_, Some(_)) => {
            tracing::debug!(entity = %memory.name, kind = %kind, "Ignoring pattern fields on non-pattern entity");
            Ok(memory)
        }
        (_, None) => Ok(memory),
    }
}

fn build_pattern(
    workspace: &Workspace,
    memory: &CodeMemory,
    input: PatternInput,
) -> Result<PatternDetails, AppError> {
    let detected_at = match input.detected_at {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AppError::InvalidParams(format!("detected_at '{}': {}", raw, e)))?,
        None => Utc::now(),
    };
    let id = input
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| {
            pattern_id(workspace, &memory.file_path, &memory.name, memory.line_number)
        });

    Ok(PatternDetails {
        id,
        pattern_type: input.pattern_type,
        category: input.category,
        implementation: input.implementation,
        confidence: input.confidence,
        best_practice: input.best_practice,
        reference_url: input.reference_url,
        is_positive: input.is_positive,
        detected_at,
    })
}

fn build_relationship(input: RelationshipInput) -> Result<Relationship, AppError> {
    let rel_type: RelationshipType = input.rel_type.parse().map_err(AppError::InvalidParams)?;
    let mut relationship = Relationship::new(input.from, input.to, rel_type);
    relationship.properties =
        metadata_from_json(JsonValue::Object(input.properties.into_iter().collect()));
    Ok(relationship)
}
