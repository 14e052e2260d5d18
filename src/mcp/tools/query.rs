//! Search tools.
//!
//! These tools provide thin MCP handlers that delegate to SearchService.

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use rmcp::schemars::{self, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::di::FromContext;
use crate::error::AppError;
use crate::mcp::dispatcher::ToolProvider;
use crate::mcp::protocol::{render, tool_error, OutputFormat, ToolDefinition};
use crate::models::{CollectionKind, EntityKind, Workspace};
use crate::services::{SearchService, SemanticQuery};

use super::{optional_workspace, parse_args, unknown_tool};

/// Parameters for query tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Natural language search query.
    pub query: String,
    /// Workspace to search.
    pub context: String,
    /// Restrict to one collection (files, classes, methods, patterns) or an
    /// entity kind (class, method, ...).
    #[serde(default)]
    pub kind: Option<String>,
    /// Maximum number of results (default: 10).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Minimum similarity score (0.0 to 1.0, default: 0.5).
    #[serde(default)]
    pub min_score: Option<f32>,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Parameters for full_text_search tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FullTextSearchParams {
    /// Keywords; search operators are matched literally.
    pub query: String,
    /// Workspace to search; all workspaces when omitted.
    #[serde(default)]
    pub context: Option<String>,
    /// Maximum number of results (default: 10).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(FromContext, Clone)]
pub struct QueryTools {
    search: SearchService,
}

#[async_trait]
impl ToolProvider for QueryTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new::<QueryParams>(
                "query",
                "Semantic search over a workspace's indexed code. Searches every collection \
                 and returns the globally best-scoring hits.",
            ),
            ToolDefinition::new::<FullTextSearchParams>(
                "full_text_search",
                "Keyword search over entity names, content and file paths.",
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
            "query" => {
                let params: QueryParams = parse_args(name, arguments)?;
                let query = SemanticQuery {
                    workspace: Workspace::new(&params.context)?,
                    text: params.query,
                    kinds: params
                        .kind
                        .as_deref()
                        .map(parse_collection)
                        .transpose()?
                        .into_iter()
                        .collect(),
                    limit: params.limit,
                    min_score: params.min_score,
                };
                let results = self.search.semantic(query, cancel).await?;
                render(&results, params.format)
            }
            "full_text_search" => {
                let params: FullTextSearchParams = parse_args(name, arguments)?;
                let workspace = optional_workspace(params.context.as_deref())?;
                let results = self
                    .search
                    .full_text(workspace.as_ref(), &params.query, params.limit, cancel)
                    .await?;
                render(&results, params.format)
            }
            _ => Ok(tool_error(unknown_tool("query tools", name).to_string())),
        }
    }
}

/// Accepts a collection suffix or any entity kind.
fn parse_collection(kind: &str) -> Result<CollectionKind, AppError> {
    let lower = kind.trim().to_lowercase();
    if let Some(collection) = CollectionKind::ALL.iter().find(|c| c.suffix() == lower) {
        return Ok(*collection);
    }
    lower
        .parse::<EntityKind>()
        .map(|k| k.collection_kind())
        .map_err(AppError::InvalidParams)
}
