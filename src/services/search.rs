//! Semantic and full-text search.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::{AppEmbedder, AppGraphs, AppVectors, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{CollectionKind, SearchHit, TextMatch, Workspace};
use crate::repositories::QueryRepository;
use crate::retry::RetryPolicy;

/// Parameters for a semantic query.
#[derive(Debug, Clone)]
pub struct SemanticQuery {
    pub workspace: Workspace,
    pub text: String,
    /// Collections to search; empty means all.
    pub kinds: Vec<CollectionKind>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticResults {
    pub context: String,
    pub query: String,
    pub min_score: f32,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextResults {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub matches: Vec<TextMatch>,
}

#[derive(FromContext, Clone)]
pub struct SearchService {
    queries: QueryRepository,
    graphs: AppGraphs,
    vectors: AppVectors,
    embedder: AppEmbedder,
    config: Arc<Config>,
    retry: RetryPolicy,
}

impl SearchService {
    /// Embeds the query text and runs a federated vector search.
    ///
    /// Unlike indexing, a query that cannot be embedded is an error: a zero
    /// vector would match nothing.
    pub async fn semantic(
        &self,
        query: SemanticQuery,
        cancel: &CancellationToken,
    ) -> Result<SemanticResults, AppError> {
        if query.text.trim().is_empty() {
            return Err(AppError::InvalidParams("query must not be empty".into()));
        }

        let search = &self.config.search;
        let limit = query.limit.unwrap_or(search.default_limit).max(1);
        let min_score = query.min_score.unwrap_or(search.min_score);

        let vector = self.embedder.try_embed(&query.text, cancel).await?;
        let hits = self
            .vectors
            .search(&query.workspace, &vector, &query.kinds, limit, min_score, cancel)
            .await?;

        tracing::debug!(
            workspace = %query.workspace,
            hits = hits.len(),
            limit,
            "Semantic search"
        );

        Ok(SemanticResults {
            context: query.workspace.to_string(),
            query: query.text,
            min_score,
            hits,
        })
    }

    /// Full-text search in one workspace, or across all when `workspace` is
    /// `None`.
    pub async fn full_text(
        &self,
        workspace: Option<&Workspace>,
        text: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<TextResults, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidParams("query must not be empty".into()));
        }
        let limit = limit.unwrap_or(self.config.search.default_limit).max(1);

        let matches = match workspace {
            Some(workspace) => {
                let graph = self.graphs.workspace(workspace).await?;
                self.retry
                    .run("full-text search", cancel, || {
                        self.queries.full_text(&graph, text, limit)
                    })
                    .await?
            }
            None => {
                self.retry
                    .run("full-text search", cancel, || {
                        self.queries.full_text_all(text, limit)
                    })
                    .await?
            }
        };

        Ok(TextResults {
            query: text.to_string(),
            context: workspace.map(|w| w.to_string()),
            matches,
        })
    }
}
