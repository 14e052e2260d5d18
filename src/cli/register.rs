//! Register command handler.

use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;
use crate::di::FromRef;
use crate::models::Workspace;
use crate::services::WorkspaceService;

use super::App;

impl App {
    /// Provision a workspace and print the registration as JSON.
    pub async fn run_register(&self, path: &Path, context: Option<&str>) -> Result<()> {
        let path = path.canonicalize()?;
        let name = match context {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| eyre!("cannot derive a workspace name from {}", path.display()))?,
        };
        let workspace = Workspace::new(&name)?;

        let config = Config::load()?;
        let ctx = Context::from(config).await?;
        let service = WorkspaceService::from_ref(&ctx);

        let registration = service
            .register(&path, &workspace, &CancellationToken::new())
            .await?;

        println!("{}", serde_json::to_string_pretty(&registration)?);
        if registration.needs_indexing {
            tracing::info!(workspace = %workspace, "Workspace is empty; run a full index");
        }
        Ok(())
    }
}
