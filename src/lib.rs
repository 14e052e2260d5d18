//! codevault - persistent code memory.
//!
//! Indexes extracted code entities into a graph store (structure) and a
//! vector store (semantic similarity), isolated per workspace, and serves
//! both over MCP.

pub mod cli;
pub mod config;
pub mod context;
pub mod di;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod models;
pub mod repositories;
pub mod retry;
pub mod services;
pub mod vector;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
