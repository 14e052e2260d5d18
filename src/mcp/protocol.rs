//! JSON-RPC 2.0 envelopes and MCP response helpers.

use rmcp::model::{CallToolResult, Content};
use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method prefix of notifications, which never get a response.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

/// An inbound request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

impl JsonRpcRequest {
    /// Whether the sender expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with(NOTIFICATION_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// A response envelope carrying either `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonValue, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, JsonValue>>,
}

/// A `tools/list` entry.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Describes a tool whose arguments deserialize into `P`.
    pub fn new<P: JsonSchema>(name: &str, description: &str) -> Self {
        let input_schema = serde_json::to_value(schemars::schema_for!(P)).unwrap_or_else(|err| {
            tracing::warn!(tool = name, error = %err, "Could not render input schema");
            serde_json::json!({ "type": "object" })
        });
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Output format for tool responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// JSON format (default).
    #[default]
    Json,
    /// TOON (Token-Oriented Object Notation) - 40-60% fewer tokens.
    Toon,
}

/// Renders a value as a single text content block.
pub fn render<T: Serialize>(
    value: &T,
    format: Option<OutputFormat>,
) -> Result<CallToolResult, AppError> {
    let text = match format.unwrap_or_default() {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| AppError::Internal(format!("JSON serialization failed: {}", e)))?,
        OutputFormat::Toon => serde_toon::to_string(value)
            .map_err(|e| AppError::Internal(format!("TOON serialization failed: {}", e)))?,
    };
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// A tool-level failure: a successful JSON-RPC response with `isError` set.
pub fn tool_error(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

/// Marks a rendered result as failed while keeping its content.
pub fn mark_error(mut result: CallToolResult) -> CallToolResult {
    result.is_error = Some(true);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_without_id_are_notifications() {
        let request: JsonRpcRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "tools/list" })).unwrap();
        assert!(request.is_notification());

        let request: JsonRpcRequest = serde_json::from_value(
            json!({ "jsonrpc": "2.0", "id": 1, "method": "notifications/initialized" }),
        )
        .unwrap();
        assert!(request.is_notification());

        let request: JsonRpcRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
                .unwrap();
        assert!(!request.is_notification());
    }

    #[test]
    fn failure_envelope_omits_result() {
        let response = JsonRpcResponse::failure(json!(7), -32601, "Method not found: foo");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn tool_error_sets_flag() {
        let value = serde_json::to_value(tool_error("boom")).unwrap();

        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "boom");
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct DemoParams {
        /// Workspace name.
        context: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn definition_carries_schema() {
        let definition = ToolDefinition::new::<DemoParams>("demo", "A demo tool");
        let value = serde_json::to_value(&definition).unwrap();

        assert_eq!(value["name"], "demo");
        assert_eq!(value["inputSchema"]["type"], "object");
        assert!(value["inputSchema"]["properties"]["context"].is_object());
        assert_eq!(value["inputSchema"]["required"], json!(["context"]));
    }
}
