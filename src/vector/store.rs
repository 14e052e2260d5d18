//! Qdrant REST client with per-workspace collection lifecycle.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::types::{id_to_string, Envelope, PointBody, ScoredPoint, ScrollPage, VectorPoint};
use crate::config::QdrantConfig;
use crate::error::AppError;
use crate::models::{CollectionKind, SearchHit, Workspace};
use crate::retry::RetryPolicy;

const SERVICE: &str = "qdrant";
const SCROLL_PAGE_SIZE: usize = 256;

/// Vector store client.
///
/// Shared by all requests; collections are provisioned lazily and the set of
/// known collections is cached so each is checked at most once per process.
pub struct VectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    vector_size: usize,
    retry: RetryPolicy,
    provisioned: RwLock<HashSet<String>>,
}

impl VectorStore {
    pub fn new(config: &QdrantConfig, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vector_size: config.vector_size,
            retry,
            provisioned: RwLock::new(HashSet::new()),
        })
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Creates the workspace's collections if they do not exist.
    ///
    /// Idempotent: an existing collection is left untouched and a concurrent
    /// creation (409) counts as success.
    pub async fn ensure_collections(
        &self,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AppError> {
        let names = workspace.collections();
        try_join_all(
            names
                .iter()
                .map(|name| self.ensure_collection(workspace, name, cancel)),
        )
        .await?;
        Ok(names)
    }

    async fn ensure_collection(
        &self,
        workspace: &Workspace,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        workspace.ensure_owns(name)?;
        if self.provisioned.read().await.contains(name) {
            return Ok(());
        }

        let path = format!("/collections/{}", name);
        match self.call::<JsonValue>(Method::GET, &path, None, cancel).await {
            Ok(_) => {}
            Err(AppError::Upstream { status: 404, .. }) => {
                let body = json!({
                    "vectors": { "size": self.vector_size, "distance": "Cosine" }
                });
                match self.call::<JsonValue>(Method::PUT, &path, Some(&body), cancel).await {
                    Ok(_) => {
                        tracing::info!(collection = name, size = self.vector_size, "Created collection")
                    }
                    Err(AppError::Upstream { status: 409, .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }

        self.provisioned.write().await.insert(name.to_string());
        Ok(())
    }

    /// Upserts points into their kind's collection, provisioning first.
    ///
    /// Points whose vector length does not match the collection size are
    /// skipped. Returns the number of points written.
    pub async fn upsert(
        &self,
        workspace: &Workspace,
        points: &[VectorPoint],
        cancel: &CancellationToken,
    ) -> Result<usize, AppError> {
        if points.is_empty() {
            return Ok(0);
        }
        self.ensure_collections(workspace, cancel).await?;

        let mut written = 0;
        for kind in CollectionKind::ALL {
            let batch: Vec<PointBody<'_>> = points
                .iter()
                .filter(|p| p.kind == kind)
                .filter(|p| {
                    let ok = p.vector.len() == self.vector_size;
                    if !ok {
                        tracing::warn!(
                            point = %p.id,
                            expected = self.vector_size,
                            actual = p.vector.len(),
                            "Skipping point with wrong vector size"
                        );
                    }
                    ok
                })
                .map(|p| PointBody {
                    id: &p.id,
                    vector: &p.vector,
                    payload: &p.payload,
                })
                .collect();
            if batch.is_empty() {
                continue;
            }

            let collection = workspace.collection(kind);
            let path = format!("/collections/{}/points?wait=true", collection);
            let body = json!({ "points": batch });
            self.call::<JsonValue>(Method::PUT, &path, Some(&body), cancel)
                .await?;

            tracing::debug!(collection = %collection, count = batch.len(), "Upserted points");
            written += batch.len();
        }

        Ok(written)
    }

    /// Federated similarity search across the workspace's collections.
    ///
    /// Each collection is searched independently for up to `limit` hits above
    /// `min_score`; the union is then sorted by score and truncated, so the
    /// result is the true global top-`limit`. Collections that cannot be
    /// searched are skipped with a warning.
    pub async fn search(
        &self,
        workspace: &Workspace,
        vector: &[f32],
        kinds: &[CollectionKind],
        limit: usize,
        min_score: f32,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if let Err(err) = self.ensure_collections(workspace, cancel).await {
            if matches!(err, AppError::Cancelled) {
                return Err(err);
            }
            tracing::warn!(workspace = %workspace, error = %err, "Could not provision collections before search");
        }

        let kinds = if kinds.is_empty() {
            &CollectionKind::ALL[..]
        } else {
            kinds
        };
        let body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": min_score,
            "with_payload": true,
        });

        let searches = kinds.iter().map(|kind| {
            let collection = workspace.collection(*kind);
            let body = &body;
            async move {
                let path = format!("/collections/{}/points/search", collection);
                let result = self
                    .call::<Envelope<Vec<ScoredPoint>>>(Method::POST, &path, Some(body), cancel)
                    .await;
                (*kind, collection, result)
            }
        });

        let mut hits = Vec::new();
        for (kind, collection, result) in join_all(searches).await {
            match result {
                Ok(envelope) => hits.extend(
                    envelope
                        .result
                        .into_iter()
                        .filter(|p| p.score >= min_score)
                        .map(|p| SearchHit {
                            id: id_to_string(&p.id),
                            score: p.score,
                            collection: kind,
                            payload: p.payload.unwrap_or_default(),
                        }),
                ),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(err) => {
                    tracing::warn!(collection = %collection, error = %err, "Skipping collection in federated search")
                }
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    /// All distinct `file_path` values stored for the workspace.
    ///
    /// Scrolls every collection page by page, fetching only the `file_path`
    /// payload field. Missing collections contribute nothing.
    pub async fn list_file_paths(
        &self,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>, AppError> {
        let scrolls = workspace
            .collections()
            .into_iter()
            .map(|collection| self.scroll_file_paths(collection, cancel));

        let mut paths = BTreeSet::new();
        for result in join_all(scrolls).await {
            paths.extend(result?);
        }
        Ok(paths)
    }

    async fn scroll_file_paths(
        &self,
        collection: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AppError> {
        let path = format!("/collections/{}/points/scroll", collection);
        let mut offset = JsonValue::Null;
        let mut paths = Vec::new();

        loop {
            let body = json!({
                "limit": SCROLL_PAGE_SIZE,
                "offset": offset,
                "with_payload": { "include": ["file_path"] },
                "with_vector": false,
            });
            let page = match self
                .call::<Envelope<ScrollPage>>(Method::POST, &path, Some(&body), cancel)
                .await
            {
                Ok(envelope) => envelope.result,
                Err(AppError::Upstream { status: 404, .. }) => break,
                Err(err) => return Err(err),
            };

            paths.extend(page.points.into_iter().filter_map(|record| {
                record
                    .payload
                    .and_then(|mut p| p.remove("file_path"))
                    .and_then(|v| v.as_str().map(str::to_string))
            }));

            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = next,
                _ => break,
            }
        }

        Ok(paths)
    }

    /// Deletes every point tagged with `file_path` from each collection.
    ///
    /// A missing collection is not an error. Returns the collections that
    /// were purged.
    pub async fn delete_by_file_path(
        &self,
        workspace: &Workspace,
        file_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AppError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "file_path", "match": { "value": file_path } }]
            }
        });

        let deletes = workspace.collections().into_iter().map(|collection| {
            let body = &body;
            async move {
                workspace.ensure_owns(&collection)?;
                let path = format!("/collections/{}/points/delete?wait=true", collection);
                match self.call::<JsonValue>(Method::POST, &path, Some(body), cancel).await {
                    Ok(_) => Ok(Some(collection)),
                    Err(AppError::Upstream { status: 404, .. }) => Ok(None),
                    Err(err) => Err(err),
                }
            }
        });

        let mut purged = Vec::new();
        for result in join_all(deletes).await {
            if let Some(collection) = result? {
                purged.push(collection);
            }
        }
        Ok(purged)
    }

    /// Reachability check.
    pub async fn health(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        self.call::<JsonValue>(Method::GET, "/collections", None, cancel)
            .await
            .map(|_| ())
    }

    /// Sends one request under the retry policy, decoding the JSON response.
    ///
    /// Non-success statuses become [`AppError::Upstream`]; 5xx and 429 are
    /// retried, everything else is returned immediately.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<T, AppError> {
        let operation = format!("{} {}", method, path);
        self.retry
            .run(&operation, cancel, || self.send(method.clone(), path, body))
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<T, AppError> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(upstream(status, message));
        }
        Ok(response.json::<T>().await?)
    }
}

fn upstream(status: StatusCode, message: String) -> AppError {
    AppError::Upstream {
        service: SERVICE,
        status: status.as_u16(),
        message,
    }
}
