//! Application context providing dependency injection root.

use std::sync::Arc;

use crate::config::Config;
use crate::di::Context as ContextDerive;
use crate::embedding::EmbeddingClient;
use crate::error::AppError;
use crate::graph::GraphRouter;
use crate::retry::RetryPolicy;
use crate::vector::VectorStore;

/// Graph connections, routed per workspace.
pub type AppGraphs = Arc<GraphRouter>;

/// Vector store client.
pub type AppVectors = Arc<VectorStore>;

/// Embedding endpoint client.
pub type AppEmbedder = Arc<EmbeddingClient>;

/// Root application context for dependency injection.
///
/// `#[derive(Context)]` generates a `FromRef` impl per field, so services
/// deriving `FromContext` resolve their dependencies at compile time. Every
/// client here is long-lived and safe for concurrent use.
#[derive(ContextDerive, Clone)]
pub struct Context {
    pub graphs: AppGraphs,
    pub vectors: AppVectors,
    pub embedder: AppEmbedder,
    pub config: Arc<Config>,
    pub retry: RetryPolicy,
}

impl Context {
    /// Builds the context, connecting to the graph store.
    ///
    /// The HTTP collaborators connect lazily on first request.
    pub async fn from(config: Config) -> Result<Self, AppError> {
        let retry = RetryPolicy::from_config(&config.retry);

        tracing::info!(uri = %config.neo4j.uri, "Connecting to Neo4j");
        let graphs = GraphRouter::connect(&config.neo4j).await?;

        let vectors = VectorStore::new(&config.qdrant, retry.clone())?;
        let embedder = EmbeddingClient::new(&config.embedding, retry.clone())?;

        if config.qdrant.vector_size != config.embedding.dimensions {
            tracing::warn!(
                vector_size = config.qdrant.vector_size,
                dimensions = config.embedding.dimensions,
                "Vector size and embedding dimensions differ; generated embeddings will be rejected"
            );
        }

        Ok(Self {
            graphs: Arc::new(graphs),
            vectors: Arc::new(vectors),
            embedder: Arc::new(embedder),
            config: Arc::new(config),
            retry,
        })
    }
}
