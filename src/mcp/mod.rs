//! Model Context Protocol (MCP) server for codevault.
//!
//! Exposes workspace registration, indexing, search and analysis as MCP
//! tools over line-delimited JSON-RPC 2.0.
//!
//! ## Architecture
//!
//! Tool providers are resolved from the `Context` through `FromRef` and
//! registered once with the [`Dispatcher`], which routes `tools/call` by
//! tool name.
//!
//! ## Modules
//!
//! - `protocol`: JSON-RPC envelopes and response helpers
//! - `dispatcher`: method routing and the tool registry
//! - `server`: stdio transport
//! - `tools`: tool providers organized by domain

pub mod dispatcher;
pub mod protocol;
pub(crate) mod server;
mod tools;

pub use dispatcher::{Dispatcher, ToolProvider};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, OutputFormat, ToolDefinition};
pub use server::McpServer;
pub use tools::providers;
