//! Line-delimited JSON-RPC over stdio.
//!
//! Each inbound line is handled on its own task; responses are funnelled
//! through a channel to a single writer so frames never interleave.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::AppError;

use super::dispatcher::Dispatcher;
use super::tools;

/// codevault MCP server.
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl McpServer {
    /// Create a server exposing every tool provider over the given context.
    pub fn new(ctx: Context) -> Self {
        tracing::info!("Initializing codevault MCP server");
        Self::with_dispatcher(Dispatcher::new(tools::providers(&ctx)))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            shutdown: CancellationToken::new(),
        }
    }

    /// Serves stdin/stdout until stdin closes or Ctrl-C.
    pub async fn serve_stdio(self) -> Result<(), AppError> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        });
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves one connection. Returns once the reader is exhausted and every
    /// in-flight request has been answered, or on shutdown.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), AppError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_frames(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = JoinSet::new();

        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line
                    .map_err(|e| AppError::Internal(format!("failed to read request: {}", e)))?,
            };
            let Some(line) = line else {
                tracing::debug!("Input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let cancel = self.shutdown.child_token();
            let tx = tx.clone();
            in_flight.spawn(async move {
                let Some(response) = dispatcher.handle_message(&line, &cancel).await else {
                    return;
                };
                match serde_json::to_string(&response) {
                    Ok(frame) => {
                        if tx.send(frame).is_err() {
                            tracing::warn!("Writer closed, dropping response");
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "Could not serialize response"),
                }
            });

            // Reap finished requests so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        drop(tx);

        writer_task
            .await
            .map_err(|e| AppError::Internal(format!("writer task failed: {}", e)))?;
        tracing::info!("MCP server stopped");
        Ok(())
    }
}

async fn write_frames<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let written = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = written {
            tracing::error!(error = %err, "Failed to write response");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::dispatcher::ToolProvider;
    use crate::mcp::protocol::{render, ToolDefinition};
    use rmcp::model::CallToolResult;
    use rmcp::schemars::{self, JsonSchema};
    use serde::Deserialize;
    use serde_json::{json, Map, Value as JsonValue};
    use tokio::io::AsyncReadExt;

    #[derive(Deserialize, JsonSchema)]
    struct NoParams {}

    struct PingTools;

    #[async_trait::async_trait]
    impl ToolProvider for PingTools {
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new::<NoParams>("pong", "Reply")]
        }

        async fn call(
            &self,
            _name: &str,
            _arguments: Map<String, JsonValue>,
            _cancel: &CancellationToken,
        ) -> Result<CallToolResult, AppError> {
            render(&json!({ "pong": true }), None)
        }
    }

    #[tokio::test]
    async fn answers_requests_and_skips_notifications() {
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
            String::new(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": { "name": "pong" } })
                .to_string(),
        ]
        .join("\n");

        let (client, server_side) = tokio::io::duplex(64 * 1024);
        let server = McpServer::with_dispatcher(Dispatcher::new(vec![Arc::new(PingTools)]));
        server
            .serve(input.as_bytes(), server_side)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();

        let mut ids: Vec<i64> = output
            .lines()
            .map(|line| serde_json::from_str::<JsonValue>(line).unwrap()["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn bad_frames_are_answered_and_session_continues() {
        let input = [
            "{not json".to_string(),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" }).to_string(),
        ]
        .join("\n");

        let (mut client, server_side) = tokio::io::duplex(64 * 1024);
        let server = McpServer::with_dispatcher(Dispatcher::new(vec![Arc::new(PingTools)]));
        server
            .serve(input.as_bytes(), server_side)
            .await
            .unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        let responses: Vec<JsonValue> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3, "{output}");

        let code_for = |id: JsonValue| {
            responses
                .iter()
                .find(|r| r["id"] == id)
                .map(|r| r["error"]["code"].clone())
                .unwrap()
        };
        assert_eq!(code_for(JsonValue::Null), -32700);
        assert_eq!(code_for(json!(3)), -32601);

        let ping = responses.iter().find(|r| r["id"] == 4).unwrap();
        assert_eq!(ping["result"], json!({}));
    }
}
