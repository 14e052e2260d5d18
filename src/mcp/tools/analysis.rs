//! Structural analysis tools.

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
use crate::services::AnalysisService;

use super::{optional_workspace, parse_args, unknown_tool};

/// Parameters for impact_analysis tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImpactAnalysisParams {
    pub class_name: String,
    /// Workspace of the class; looked up when omitted.
    #[serde(default)]
    pub context: Option<String>,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Parameters for dependency_chain tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DependencyChainParams {
    pub class_name: String,
    pub context: String,
    /// Maximum hops to follow (default: 5).
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Parameters for find_circular_dependencies tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindCyclesParams {
    /// Workspace to check; all workspaces when omitted.
    #[serde(default)]
    pub context: Option<String>,
    /// Output format: json (default) or toon.
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(FromContext, Clone)]
pub struct AnalysisTools {
    analysis: AnalysisService,
}

#[async_trait]
impl ToolProvider for AnalysisTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new::<ImpactAnalysisParams>(
                "impact_analysis",
                "List everything that inherits from or uses a class, directly or transitively.",
            ),
            ToolDefinition::new::<DependencyChainParams>(
                "dependency_chain",
                "List what a class uses, nearest dependencies first.",
            ),
            ToolDefinition::new::<FindCyclesParams>(
                "find_circular_dependencies",
                "Find USES cycles between classes.",
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
            "impact_analysis" => {
                let params: ImpactAnalysisParams = parse_args(name, arguments)?;
                let workspace = optional_workspace(params.context.as_deref())?;
                let report = self
                    .analysis
                    .impact_analysis(workspace, &params.class_name, cancel)
                    .await?;
                render(&report, params.format)
            }
            "dependency_chain" => {
                let params: DependencyChainParams = parse_args(name, arguments)?;
                let workspace = Workspace::new(&params.context)?;
                let chain = self
                    .analysis
                    .dependency_chain(&workspace, &params.class_name, params.max_depth, cancel)
                    .await?;
                render(&chain, params.format)
            }
            "find_circular_dependencies" => {
                let params: FindCyclesParams = parse_args(name, arguments)?;
                let workspace = optional_workspace(params.context.as_deref())?;
                let report = self.analysis.find_cycles(workspace.as_ref(), cancel).await?;
                render(&report, params.format)
            }
            _ => Ok(tool_error(unknown_tool("analysis tools", name).to_string())),
        }
    }
}
