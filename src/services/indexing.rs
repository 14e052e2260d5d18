//! Hybrid write path: one batch, two stores.
//!
//! Graph and vector writes for a batch run concurrently and independently.
//! A failure on one side is reported next to the other side's result; there
//! is no cross-store rollback.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::context::{AppEmbedder, AppVectors, Context};
use crate::di::FromContext;
use crate::embedding::is_zero_vector;
use crate::error::AppError;
use crate::models::{CodeMemory, Relationship, Workspace};
use crate::repositories::{MemoryRepository, WriteCounts};
use crate::retry::RetryPolicy;
use crate::vector::VectorPoint;

/// A batch of extracted entities for one workspace.
#[derive(Debug, Clone)]
pub struct IndexBatch {
    pub workspace: Workspace,
    pub memories: Vec<CodeMemory>,
    pub relationships: Vec<Relationship>,
    /// Embed entities that arrive without an embedding.
    pub generate_embeddings: bool,
}

/// Graph side of an [`IndexReport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphWrite {
    pub nodes: usize,
    pub relationships: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Vector side of an [`IndexReport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct VectorWrite {
    pub points: usize,
    /// Entities left out of the vector store for lack of a usable embedding.
    pub skipped: usize,
    /// Embeddings generated for this batch.
    pub generated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-store outcome of a batch write.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub context: String,
    pub graph: GraphWrite,
    pub vector: VectorWrite,
}

impl IndexReport {
    /// True when neither store reported an error.
    pub fn is_complete(&self) -> bool {
        self.graph.error.is_none() && self.vector.error.is_none()
    }
}

/// Graph side of a [`DeleteReport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphDelete {
    pub nodes_removed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Vector side of a [`DeleteReport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct VectorDelete {
    pub collections_purged: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-store outcome of deleting a file.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub context: String,
    pub file_path: String,
    pub graph: GraphDelete,
    pub vector: VectorDelete,
}

impl DeleteReport {
    /// Folds both stores' results into a report. Cancellation on either
    /// side cancels the whole call.
    fn from_results(
        workspace: &Workspace,
        file_path: &str,
        graph: Result<i64, AppError>,
        vector: Result<Vec<String>, AppError>,
    ) -> Result<Self, AppError> {
        if matches!(graph, Err(AppError::Cancelled)) || matches!(vector, Err(AppError::Cancelled)) {
            return Err(AppError::Cancelled);
        }

        let graph = match graph {
            Ok(nodes_removed) => GraphDelete {
                nodes_removed,
                error: None,
            },
            Err(err) => {
                tracing::error!(workspace = %workspace, file_path, error = %err, "Graph delete failed");
                GraphDelete {
                    nodes_removed: 0,
                    error: Some(err.to_string()),
                }
            }
        };
        let vector = match vector {
            Ok(collections_purged) => VectorDelete {
                collections_purged,
                error: None,
            },
            Err(err) => {
                tracing::error!(workspace = %workspace, file_path, error = %err, "Vector delete failed");
                VectorDelete {
                    collections_purged: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };

        Ok(Self {
            context: workspace.to_string(),
            file_path: file_path.to_string(),
            graph,
            vector,
        })
    }

    /// True when neither store reported an error.
    pub fn is_complete(&self) -> bool {
        self.graph.error.is_none() && self.vector.error.is_none()
    }
}

#[derive(FromContext, Clone)]
pub struct IndexingService {
    memories: MemoryRepository,
    vectors: AppVectors,
    embedder: AppEmbedder,
    retry: RetryPolicy,
}

impl IndexingService {
    /// Writes a batch to the graph and vector stores.
    ///
    /// Entities without a usable embedding still reach the graph. Only
    /// cancellation and invalid input abort the call; store failures are
    /// reported per side.
    pub async fn index(
        &self,
        mut batch: IndexBatch,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, AppError> {
        if let Some(stray) = batch
            .memories
            .iter()
            .find(|m| m.context != batch.workspace)
        {
            return Err(AppError::Validation(format!(
                "entity '{}' belongs to workspace '{}', not '{}'",
                stray.name, stray.context, batch.workspace
            )));
        }

        let generated = if batch.generate_embeddings {
            self.fill_embeddings(&mut batch.memories, cancel).await?
        } else {
            0
        };

        let points = vector_points(&batch.memories);
        let skipped = batch.memories.len() - points.len();
        let workspace = &batch.workspace;

        let graph_write = async {
            let graph = self.memories.graph(workspace).await?;
            self.retry
                .run("graph store", cancel, || {
                    self.memories
                        .store(&graph, &batch.memories, &batch.relationships)
                })
                .await
        };
        let vector_write = self.vectors.upsert(workspace, &points, cancel);

        let (graph_result, vector_result) = tokio::join!(graph_write, vector_write);

        if matches!(graph_result, Err(AppError::Cancelled))
            || matches!(vector_result, Err(AppError::Cancelled))
        {
            return Err(AppError::Cancelled);
        }

        let graph = match graph_result {
            Ok(WriteCounts {
                nodes,
                relationships,
            }) => GraphWrite {
                nodes,
                relationships,
                error: None,
            },
            Err(err) => {
                tracing::error!(workspace = %workspace, error = %err, "Graph write failed");
                GraphWrite {
                    error: Some(err.to_string()),
                    ..GraphWrite::default()
                }
            }
        };

        let vector = match vector_result {
            Ok(written) => VectorWrite {
                points: written,
                skipped: skipped + (points.len() - written),
                generated,
                error: None,
            },
            Err(err) => {
                tracing::error!(workspace = %workspace, error = %err, "Vector write failed");
                VectorWrite {
                    points: 0,
                    skipped,
                    generated,
                    error: Some(err.to_string()),
                }
            }
        };

        tracing::info!(
            workspace = %workspace,
            nodes = graph.nodes,
            relationships = graph.relationships,
            points = vector.points,
            "Indexed batch"
        );

        Ok(IndexReport {
            context: workspace.to_string(),
            graph,
            vector,
        })
    }

    /// Removes a file's entities from both stores.
    ///
    /// Both deletes always run to completion; failures are reported per side.
    pub async fn delete_file(
        &self,
        workspace: &Workspace,
        file_path: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport, AppError> {
        let graph_delete = async {
            let graph = self.memories.graph(workspace).await?;
            self.retry
                .run("graph delete", cancel, || {
                    self.memories.delete_by_file_path(&graph, file_path)
                })
                .await
        };
        let vector_delete = self.vectors.delete_by_file_path(workspace, file_path, cancel);

        let (graph_result, vector_result) = tokio::join!(graph_delete, vector_delete);
        let report = DeleteReport::from_results(workspace, file_path, graph_result, vector_result)?;

        tracing::info!(
            workspace = %workspace,
            file_path,
            nodes = report.graph.nodes_removed,
            collections = report.vector.collections_purged.len(),
            "Deleted file"
        );

        Ok(report)
    }

    /// Embeds entities that have no embedding. Returns how many usable
    /// embeddings were produced.
    async fn fill_embeddings(
        &self,
        memories: &mut [CodeMemory],
        cancel: &CancellationToken,
    ) -> Result<usize, AppError> {
        let missing: Vec<usize> = memories
            .iter()
            .enumerate()
            .filter(|(_, m)| m.embedding.is_none())
            .map(|(idx, _)| idx)
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing
            .iter()
            .map(|&idx| memories[idx].embedding_text())
            .collect();
        let embeddings = self.embedder.embed_batch(&texts, cancel).await?;

        let mut generated = 0;
        for (idx, embedding) in missing.into_iter().zip(embeddings) {
            if !is_zero_vector(&embedding) {
                memories[idx].embedding = Some(embedding);
                generated += 1;
            }
        }
        Ok(generated)
    }
}

/// One point per entity with a non-zero embedding.
fn vector_points(memories: &[CodeMemory]) -> Vec<VectorPoint> {
    memories
        .iter()
        .filter_map(|memory| {
            let vector = memory.embedding.as_ref()?;
            if is_zero_vector(vector) {
                return None;
            }
            Some(VectorPoint {
                id: memory.point_id(),
                kind: memory.kind.collection_kind(),
                vector: vector.clone(),
                payload: memory.properties(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionKind, EntityKind};

    fn workspace() -> Workspace {
        Workspace::new("demo").unwrap()
    }

    #[test]
    fn only_usable_embeddings_become_points() {
        let memories = vec![
            CodeMemory::new(workspace(), EntityKind::Class, "Foo").with_embedding(vec![0.1, 0.2]),
            CodeMemory::new(workspace(), EntityKind::Method, "bar").with_embedding(vec![0.0, 0.0]),
            CodeMemory::new(workspace(), EntityKind::File, "foo.rs"),
        ];

        let points = vector_points(&memories);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, CollectionKind::Classes);
        assert_eq!(points[0].id, memories[0].point_id());
        assert_eq!(points[0].payload["name"], "Foo");
    }

    #[test]
    fn source_kinds_land_in_shaped_collections() {
        let memories = vec![
            CodeMemory::new(workspace(), EntityKind::Controller, "Api").with_embedding(vec![1.0]),
            CodeMemory::new(workspace(), EntityKind::Endpoint, "get").with_embedding(vec![1.0]),
        ];

        let kinds: Vec<_> = vector_points(&memories).iter().map(|p| p.kind).collect();

        assert_eq!(kinds, vec![CollectionKind::Classes, CollectionKind::Methods]);
    }

    #[test]
    fn report_completeness() {
        let mut report = IndexReport {
            context: "demo".into(),
            graph: GraphWrite::default(),
            vector: VectorWrite::default(),
        };
        assert!(report.is_complete());

        report.vector.error = Some("qdrant returned HTTP 500".into());
        assert!(!report.is_complete());
    }

    #[test]
    fn graph_delete_failure_keeps_vector_outcome() {
        let report = DeleteReport::from_results(
            &workspace(),
            "src/foo.rs",
            Err(AppError::Validation("graph unavailable".into())),
            Ok(vec!["demo_classes".into(), "demo_methods".into()]),
        )
        .unwrap();

        assert!(!report.is_complete());
        assert!(report.graph.error.as_deref().unwrap().contains("graph unavailable"));
        assert_eq!(report.vector.collections_purged, vec!["demo_classes", "demo_methods"]);
        assert!(report.vector.error.is_none());
    }

    #[test]
    fn vector_delete_failure_keeps_graph_outcome() {
        let report = DeleteReport::from_results(
            &workspace(),
            "src/foo.rs",
            Ok(3),
            Err(AppError::Validation("qdrant returned HTTP 500".into())),
        )
        .unwrap();

        assert_eq!(report.graph.nodes_removed, 3);
        assert!(report.vector.error.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["graph"].get("error").is_none());
        assert_eq!(json["vector"]["collections_purged"], serde_json::json!([]));
    }

    #[test]
    fn cancelled_delete_is_not_reported() {
        let result = DeleteReport::from_results(&workspace(), "src/foo.rs", Ok(1), Err(AppError::Cancelled));
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
