//! MCP tool providers organized by domain.

pub mod analysis;
pub mod index;
pub mod query;
pub mod workspace;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::context::Context;
use crate::di::FromRef;
use crate::error::AppError;
use crate::models::Workspace;

use super::dispatcher::ToolProvider;

/// Every tool provider, resolved from the context.
pub fn providers(ctx: &Context) -> Vec<Arc<dyn ToolProvider>> {
    vec![
        Arc::new(workspace::WorkspaceTools::from_ref(ctx)),
        Arc::new(index::IndexTools::from_ref(ctx)),
        Arc::new(query::QueryTools::from_ref(ctx)),
        Arc::new(analysis::AnalysisTools::from_ref(ctx)),
    ]
}

/// Deserializes tool arguments, reporting failures as invalid params.
pub(crate) fn parse_args<P: DeserializeOwned>(
    tool: &str,
    arguments: Map<String, JsonValue>,
) -> Result<P, AppError> {
    serde_json::from_value(JsonValue::Object(arguments))
        .map_err(|e| AppError::InvalidParams(format!("{}: {}", tool, e)))
}

pub(crate) fn optional_workspace(context: Option<&str>) -> Result<Option<Workspace>, AppError> {
    context
        .filter(|c| !c.trim().is_empty())
        .map(Workspace::new)
        .transpose()
}

fn unknown_tool(provider: &str, name: &str) -> AppError {
    AppError::Internal(format!("{} cannot serve tool '{}'", provider, name))
}
