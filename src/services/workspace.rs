//! Workspace registration, status and store health.

use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::context::{AppEmbedder, AppGraphs, AppVectors, Context};
use crate::di::FromContext;
use crate::embedding::EmbeddingHealth;
use crate::error::AppError;
use crate::models::{IsolationMode, Workspace};
use crate::repositories::{SchemaReport, SchemaRepository};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub context: String,
    pub path: String,
    pub collections: Vec<String>,
    pub isolation: IsolationMode,
    pub database: String,
    pub schema: SchemaReport,
    pub is_empty: bool,
    /// Set when nothing is indexed yet; the caller should run a full index.
    pub needs_indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub context: String,
    pub isolation: IsolationMode,
    pub database: String,
    pub collections: Vec<String>,
    pub file_count: usize,
    pub file_paths: Vec<String>,
    pub fulltext_index_online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreHealth {
    fn from_result(result: Result<(), AppError>) -> Self {
        match result {
            Ok(()) => Self {
                reachable: true,
                error: None,
            },
            Err(err) => Self {
                reachable: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub embedding: EmbeddingHealth,
    pub graph: StoreHealth,
    pub vector: StoreHealth,
}

#[derive(FromContext, Clone)]
pub struct WorkspaceService {
    graphs: AppGraphs,
    vectors: AppVectors,
    embedder: AppEmbedder,
    retry: RetryPolicy,
}

impl WorkspaceService {
    /// Provisions a workspace's storage. Safe to repeat.
    ///
    /// Creates the vector collections, routes the workspace to its graph
    /// database (creating it when supported), applies the schema there, and
    /// reports whether anything has been indexed yet.
    pub async fn register(
        &self,
        path: &Path,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<Registration, AppError> {
        let collections = self.vectors.ensure_collections(workspace, cancel).await?;

        let graph = self.graphs.workspace(workspace).await?;
        let schema = SchemaRepository::new(graph.unscoped()).ensure().await;

        let indexed = self.vectors.list_file_paths(workspace, cancel).await?;
        let is_empty = indexed.is_empty();

        tracing::info!(
            workspace = %workspace,
            path = %path.display(),
            isolation = ?graph.mode(),
            is_empty,
            "Registered workspace"
        );

        Ok(Registration {
            context: workspace.to_string(),
            path: path.display().to_string(),
            collections,
            isolation: graph.mode(),
            database: graph.database().to_string(),
            schema,
            is_empty,
            needs_indexing: is_empty,
        })
    }

    /// What is stored for a workspace.
    pub async fn status(
        &self,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<WorkspaceStatus, AppError> {
        let graph = self.graphs.workspace(workspace).await?;
        let file_paths: Vec<String> = self
            .vectors
            .list_file_paths(workspace, cancel)
            .await?
            .into_iter()
            .collect();

        let fulltext_index_online = match SchemaRepository::new(graph.unscoped())
            .fulltext_ready()
            .await
        {
            Ok(ready) => ready,
            Err(err) => {
                tracing::debug!(error = %err, "Could not read index state");
                false
            }
        };

        Ok(WorkspaceStatus {
            context: workspace.to_string(),
            isolation: graph.mode(),
            database: graph.database().to_string(),
            collections: workspace.collections(),
            file_count: file_paths.len(),
            file_paths,
            fulltext_index_online,
        })
    }

    /// Checks the embedding endpoint, the graph store and the vector store
    /// concurrently.
    pub async fn health(&self, cancel: &CancellationToken) -> HealthReport {
        let graph_check = async {
            self.retry
                .run("graph health", cancel, || {
                    self.graphs.shared().query("RETURN 1 AS ok").run()
                })
                .await
        };

        let (embedding, graph, vector) = tokio::join!(
            self.embedder.health(cancel),
            graph_check,
            self.vectors.health(cancel),
        );

        let graph = StoreHealth::from_result(graph);
        let vector = StoreHealth::from_result(vector);
        let healthy = embedding.model_available && graph.reachable && vector.reachable;

        if !healthy {
            tracing::warn!(
                embedding = embedding.model_available,
                graph = graph.reachable,
                vector = vector.reachable,
                "Health check degraded"
            );
        }

        HealthReport {
            healthy,
            embedding,
            graph,
            vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_health_carries_error_text() {
        let down = StoreHealth::from_result(Err(AppError::Upstream {
            service: "qdrant",
            status: 503,
            message: "starting".into(),
        }));

        assert!(!down.reachable);
        assert!(down.error.unwrap().contains("503"));
        assert!(StoreHealth::from_result(Ok(())).reachable);
    }
}
