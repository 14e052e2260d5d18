//! CLI module for codevault.
//!
//! Subcommands:
//! - `mcp`: Run the MCP server (stdio transport)
//! - `init`: Create constraints and indexes on the default database
//! - `register`: Provision storage for a workspace

mod init;
mod mcp;
mod register;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// codevault - persistent code memory
#[derive(Parser)]
#[command(name = "codevault")]
#[command(about = "Persistent code memory - hybrid graph and vector store MCP server")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the MCP server (stdio transport)
    Mcp,

    /// Create constraints, indexes and the full-text index
    Init,

    /// Register a workspace: provision collections, graph storage and schema
    Register {
        /// Root path of the codebase
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Workspace name (defaults to the directory name)
        #[arg(long)]
        context: Option<String>,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        match self.command {
            Command::Mcp => self.run_mcp().await,
            Command::Init => self.run_init().await,
            Command::Register {
                ref path,
                ref context,
            } => self.run_register(path, context.as_deref()).await,
        }
    }
}
