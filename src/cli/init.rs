//! Init command handler.

use color_eyre::Result;

use crate::config::Config;
use crate::graph::GraphRouter;
use crate::repositories::SchemaRepository;

use super::App;

impl App {
    /// Apply the schema to the default database.
    ///
    /// Dedicated workspace databases get theirs on registration.
    pub async fn run_init(&self) -> Result<()> {
        let config = Config::load()?;

        tracing::info!(uri = %config.neo4j.uri, "Connecting to Neo4j");
        let router = GraphRouter::connect(&config.neo4j).await?;

        let report = SchemaRepository::new(router.shared()).ensure().await;
        if report.skipped > 0 {
            tracing::warn!(
                applied = report.applied,
                skipped = report.skipped,
                "Schema applied with skipped statements"
            );
        } else {
            tracing::info!(applied = report.applied, "Schema applied");
        }

        if router.supports_databases().await {
            tracing::info!("Server supports per-workspace databases");
        } else {
            tracing::info!("Server has a single database; workspaces will share it");
        }

        Ok(())
    }
}
