//! Workspace lifecycle tools.

use std::path::PathBuf;

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
use crate::models::Workspace;
use crate::services::WorkspaceService;

use super::{parse_args, unknown_tool};

/// Parameters for register_workspace tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterWorkspaceParams {
    /// Root path of the codebase.
    pub path: String,
    /// Workspace name: letters, digits, `_` and `-` (case-insensitive).
    pub context: String,
}

/// Parameters for workspace_status tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceStatusParams {
    pub context: String,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Parameters for health_check tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct HealthCheckParams {}

#[derive(FromContext, Clone)]
pub struct WorkspaceTools {
    service: WorkspaceService,
}

#[async_trait]
impl ToolProvider for WorkspaceTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new::<RegisterWorkspaceParams>(
                "register_workspace",
                "Provision isolated storage for a workspace: vector collections, graph database \
                 (or context-filtered shared database) and schema. Idempotent. Reports whether \
                 the workspace still needs a full index.",
            ),
            ToolDefinition::new::<WorkspaceStatusParams>(
                "workspace_status",
                "Show a workspace's indexed file paths, isolation mode and collections.",
            ),
            ToolDefinition::new::<HealthCheckParams>(
                "health_check",
                "Check the embedding model, graph store and vector store.",
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
            "register_workspace" => {
                let params: RegisterWorkspaceParams = parse_args(name, arguments)?;
                let workspace = Workspace::new(&params.context)?;
                let registration = self
                    .service
                    .register(&PathBuf::from(params.path), &workspace, cancel)
                    .await?;
                render(&registration, None)
            }
            "workspace_status" => {
                let params: WorkspaceStatusParams = parse_args(name, arguments)?;
                let workspace = Workspace::new(&params.context)?;
                let status = self.service.status(&workspace, cancel).await?;
                render(&status, params.format)
            }
            "health_check" => {
                let _: HealthCheckParams = parse_args(name, arguments)?;
                let report = self.service.health(cancel).await;
                render(&report, None)
            }
            _ => Ok(tool_error(unknown_tool("workspace tools", name).to_string())),
        }
    }
}
