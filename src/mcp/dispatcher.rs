//! Request dispatch and the tool registry.
//!
//! The registry maps each tool name to the provider that serves it. It is
//! built once from the providers handed to [`Dispatcher::new`] and never
//! changes afterwards; the dispatcher holds no other state.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use rmcp::model::{
    CallToolResult, ErrorCode, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use serde_json::{json, Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

use super::protocol::{
    tool_error, CallToolParams, JsonRpcRequest, JsonRpcResponse, ToolDefinition,
};

const INSTRUCTIONS: &str = r#"codevault - persistent code memory

Indexed code lives in two stores: a graph for structure and a vector index
for semantic search. Every tool works inside one workspace (`context`).

## Getting Started

1. **register_workspace** - Provision storage for a workspace (idempotent)
2. **store_memories** - Index extracted files, classes, methods and patterns
3. **query** - Semantic search over indexed code

## Analysis

- **impact_analysis** - What depends on a class
- **dependency_chain** - What a class depends on
- **find_circular_dependencies** - USES cycles between classes
- **full_text_search** - Keyword search over names, content and paths
"#;

/// A set of tools served together.
#[async_trait::async_trait]
pub trait ToolProvider: Send + Sync {
    /// The tools this provider serves.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Runs one tool. `name` is always one of [`ToolProvider::tools`].
    ///
    /// Parameter errors are returned as [`AppError::InvalidParams`]; other
    /// errors become a tool result with `isError` set.
    async fn call(
        &self,
        name: &str,
        arguments: Map<String, JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, AppError>;
}

pub struct Dispatcher {
    tools: Vec<ToolDefinition>,
    registry: HashMap<String, Arc<dyn ToolProvider>>,
}

impl Dispatcher {
    pub fn new(providers: Vec<Arc<dyn ToolProvider>>) -> Self {
        let mut tools = Vec::new();
        let mut registry: HashMap<String, Arc<dyn ToolProvider>> = HashMap::new();

        for provider in providers {
            for tool in provider.tools() {
                if registry.contains_key(&tool.name) {
                    tracing::warn!(tool = %tool.name, "Duplicate tool name, keeping the first provider");
                    continue;
                }
                registry.insert(tool.name.clone(), Arc::clone(&provider));
                tools.push(tool);
            }
        }

        tracing::debug!(count = tools.len(), "Built tool registry");
        Self { tools, registry }
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Handles one raw frame. Returns `None` when no response must be sent.
    pub async fn handle_message(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let value: JsonValue = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(err) => {
                return Some(JsonRpcResponse::failure(
                    JsonValue::Null,
                    ErrorCode::PARSE_ERROR.0,
                    format!("Parse error: {}", err),
                ));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request, cancel).await,
            // Without an id nobody is waiting for the error.
            Err(err) => id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::INVALID_REQUEST.0,
                    format!("Invalid request: {}", err),
                )
            }),
        }
    }

    /// Handles one request. Returns `None` for notifications.
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        }
        let id = request.id.unwrap_or(JsonValue::Null);

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.tools })),
            "tools/call" => self.call_tool(id, request.params, cancel).await,
            other => {
                tracing::debug!(method = other, "Unknown method");
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::METHOD_NOT_FOUND.0,
                    format!("Method not found: {}", other),
                )
            }
        };
        Some(response)
    }

    async fn call_tool(
        &self,
        id: JsonValue,
        params: Option<JsonValue>,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return JsonRpcResponse::failure(
                    id,
                    ErrorCode::INVALID_PARAMS.0,
                    "Invalid params: missing tool name",
                )
            }
            Err(err) => {
                return JsonRpcResponse::failure(
                    id,
                    ErrorCode::INVALID_PARAMS.0,
                    format!("Invalid params: {}", err),
                )
            }
        };

        let Some(provider) = self.registry.get(&params.name) else {
            tracing::debug!(tool = %params.name, "Unknown tool");
            let result = tool_error(format!(
                "Unknown tool '{}'. Available tools: {}",
                params.name,
                self.tool_names().join(", ")
            ));
            return tool_response(id, &result);
        };

        tracing::debug!(tool = %params.name, "Calling tool");
        let arguments = params.arguments.unwrap_or_default();
        let outcome = AssertUnwindSafe(provider.call(&params.name, arguments, cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => tool_response(id, &result),
            Ok(Err(err)) if err.rpc_code() == ErrorCode::INVALID_PARAMS.0 => {
                JsonRpcResponse::failure(id, err.rpc_code(), err.to_string())
            }
            Ok(Err(err)) => {
                tracing::warn!(tool = %params.name, error = %err, "Tool failed");
                tool_response(id, &tool_error(format!("Error: {}", err)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %params.name, panic = %message, "Tool panicked");
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::INTERNAL_ERROR.0,
                    format!("Internal error: {}", message),
                )
            }
        }
    }
}

fn tool_response(id: JsonValue, result: &CallToolResult) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => JsonRpcResponse::failure(
            id,
            ErrorCode::INTERNAL_ERROR.0,
            format!("Internal error: {}", err),
        ),
    }
}

fn initialize_result() -> JsonValue {
    let info = ServerInfo {
        protocol_version: ProtocolVersion::V_2024_11_05,
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation::from_build_env(),
        instructions: Some(INSTRUCTIONS.to_string()),
    };
    serde_json::to_value(info).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Could not serialize server info");
        json!({ "protocolVersion": ProtocolVersion::V_2024_11_05 })
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::render;
    use rmcp::schemars::{self, JsonSchema};
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct EchoParams {
        text: String,
    }

    struct EchoTools;

    #[async_trait::async_trait]
    impl ToolProvider for EchoTools {
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![
                ToolDefinition::new::<EchoParams>("echo", "Echo the text"),
                ToolDefinition::new::<EchoParams>("explode", "Panic"),
                ToolDefinition::new::<EchoParams>("fail", "Store failure"),
            ]
        }

        async fn call(
            &self,
            name: &str,
            arguments: Map<String, JsonValue>,
            _cancel: &CancellationToken,
        ) -> Result<CallToolResult, AppError> {
            let params: EchoParams = serde_json::from_value(JsonValue::Object(arguments))
                .map_err(|e| AppError::InvalidParams(e.to_string()))?;
            match name {
                "echo" => render(&json!({ "echo": params.text }), None),
                "fail" => Err(AppError::Upstream {
                    service: "qdrant",
                    status: 500,
                    message: "down".into(),
                }),
                _ => panic!("exploded on {}", params.text),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(vec![Arc::new(EchoTools)])
    }

    async fn send(dispatcher: &Dispatcher, message: JsonValue) -> Option<JsonValue> {
        dispatcher
            .handle_message(&message.to_string(), &CancellationToken::new())
            .await
            .map(|r| serde_json::to_value(r).unwrap())
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = send(
            &dispatcher(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialize_reports_tools_capability() {
        let response = send(
            &dispatcher(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        )
        .await
        .unwrap();

        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn lists_registered_tools() {
        let response = send(
            &dispatcher(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        )
        .await
        .unwrap();

        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"]["properties"]["text"].is_object());
    }

    #[tokio::test]
    async fn calls_tool() {
        let response = send(
            &dispatcher(),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": { "name": "echo", "arguments": { "text": "hi" } }
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["id"], 3);
        assert_eq!(response["result"]["isError"], false);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"echo\": \"hi\""));
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_tools() {
        let response = send(
            &dispatcher(),
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": { "name": "nope", "arguments": {} }
            }),
        )
        .await
        .unwrap();

        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("nope"));
        assert!(text.contains("echo, explode, fail"));
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_params() {
        let response = send(
            &dispatcher(),
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": { "name": "echo", "arguments": { "text": 42 } }
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn missing_call_params_are_invalid_params() {
        let response = send(
            &dispatcher(),
            json!({ "jsonrpc": "2.0", "id": 6, "method": "tools/call" }),
        )
        .await
        .unwrap();

        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn store_failures_become_tool_errors() {
        let response = send(
            &dispatcher(),
            json!({
                "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                "params": { "name": "fail", "arguments": { "text": "x" } }
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let response = send(
            &dispatcher(),
            json!({
                "jsonrpc": "2.0", "id": 8, "method": "tools/call",
                "params": { "name": "explode", "arguments": { "text": "purpose" } }
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["error"]["code"], -32603);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("exploded on purpose"));
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let response = send(
            &dispatcher(),
            json!({ "jsonrpc": "2.0", "id": 9, "method": "resources/list" }),
        )
        .await
        .unwrap();

        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let response = dispatcher()
            .handle_message("{not json", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.id, JsonValue::Null);
        assert_eq!(response.error.unwrap().code, -32700);
    }
}
