//! Embedding client for an Ollama-compatible endpoint.
//!
//! `POST /api/embeddings {model, prompt}` returns `{embedding: [f32]}`;
//! `GET /api/tags` lists the models the server has pulled.
//!
//! Failures never abort a batch: an input that cannot be embedded after
//! retries is represented by a zero vector, which callers must treat as
//! "no embedding" (see [`is_zero_vector`]).

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::EmbeddingConfig;
use crate::error::AppError;
use crate::retry::RetryPolicy;

const SERVICE: &str = "embedding";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Result of [`EmbeddingClient::health`].
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingHealth {
    pub reachable: bool,
    pub model: String,
    pub model_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_input_chars: config.max_input_chars,
            batch_size: config.batch_size.max(1),
            retry,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embeds one text, surfacing failures.
    pub async fn try_embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, AppError> {
        let input = self.truncate(text);
        let embedding = self
            .retry
            .run("embed", cancel, || self.request_embedding(input))
            .await?;

        if embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    /// Embeds one text, substituting a zero vector on failure.
    ///
    /// Only cancellation is returned as an error.
    pub async fn embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, AppError> {
        match self.try_embed(text, cancel).await {
            Ok(embedding) => Ok(embedding),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, chars = text.len(), "Embedding failed, using zero vector");
                Ok(vec![0.0; self.dimensions])
            }
        }
    }

    /// Embeds texts in fixed-size batches, preserving order.
    ///
    /// Items within a batch run concurrently; a failed item becomes a zero
    /// vector and the rest of the batch continues.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_no, chunk) in texts.chunks(self.batch_size).enumerate() {
            let results = join_all(chunk.iter().map(|text| self.embed(text, cancel))).await;
            for result in results {
                embeddings.push(result?);
            }
            tracing::debug!(batch = batch_no, count = chunk.len(), "Embedded batch");
        }
        Ok(embeddings)
    }

    /// Reports whether the endpoint is reachable and the model is pulled.
    pub async fn health(&self, cancel: &CancellationToken) -> EmbeddingHealth {
        let tags = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.request_tags() => result,
        };

        match tags {
            Ok(tags) => EmbeddingHealth {
                reachable: true,
                model: self.model.clone(),
                model_available: tags.models.iter().any(|m| self.matches_model(&m.name)),
                error: None,
            },
            Err(err) => EmbeddingHealth {
                reachable: false,
                model: self.model.clone(),
                model_available: false,
                error: Some(err.to_string()),
            },
        }
    }

    /// Tags carry a `:version` suffix (`mxbai-embed-large:latest`).
    fn matches_model(&self, tag: &str) -> bool {
        tag == self.model
            || tag
                .strip_prefix(self.model.as_str())
                .is_some_and(|rest| rest.starts_with(':'))
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => {
                tracing::debug!(
                    chars = self.max_input_chars,
                    bytes = text.len(),
                    "Truncating embedding input"
                );
                &text[..cut]
            }
            None => text,
        }
    }

    async fn request_embedding(&self, prompt: &str) -> Result<Vec<f32>, AppError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("invalid response: {}", e)))?;
        Ok(body.embedding)
    }

    async fn request_tags(&self) -> Result<TagsResponse, AppError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

/// True for the zero-vector failure sentinel (and for empty vectors).
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn client(server: &ServerGuard, dimensions: usize) -> EmbeddingClient {
        let config = EmbeddingConfig {
            url: server.url(),
            model: "mxbai-embed-large".into(),
            dimensions,
            max_input_chars: 8,
            batch_size: 2,
            ..EmbeddingConfig::default()
        };
        EmbeddingClient::new(&config, RetryPolicy::new(0, Duration::from_millis(1))).unwrap()
    }

    #[tokio::test]
    async fn embeds_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "model": "mxbai-embed-large", "prompt": "enum Foo" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding": [0.1, 0.2, 0.3]}"#)
            .create_async()
            .await;

        let embedding = client(&server, 3)
            .try_embed("enum Foo", &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(embedding.len(), 3);
        assert!((embedding[1] - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn long_inputs_are_truncated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "prompt": "ééééllll" })))
            .with_status(200)
            .with_body(r#"{"embedding": [1.0, 0.0, 0.0]}"#)
            .create_async()
            .await;

        client(&server, 3)
            .try_embed("ééééllllong input", &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failure_yields_zero_vector() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("model crashed")
            .create_async()
            .await;

        let embedding = client(&server, 4)
            .embed("class Foo", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(embedding, vec![0.0; 4]);
        assert!(is_zero_vector(&embedding));
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_body(r#"{"embedding": [0.1, 0.2]}"#)
            .create_async()
            .await;

        let result = client(&server, 3)
            .try_embed("x", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::Embedding(_))));
    }

    #[tokio::test]
    async fn batch_isolates_failed_items() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "prompt": "bad" })))
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "prompt": "good" })))
            .with_status(200)
            .with_body(r#"{"embedding": [0.5, 0.5]}"#)
            .create_async()
            .await;

        let texts: Vec<String> = ["good", "bad", "good"].iter().map(|s| s.to_string()).collect();
        let embeddings = client(&server, 2)
            .embed_batch(&texts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0], vec![0.5, 0.5]);
        assert!(is_zero_vector(&embeddings[1]));
        assert_eq!(embeddings[2], vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn health_reports_model_availability() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "mxbai-embed-large:latest"}, {"name": "llama3:8b"}]}"#)
            .create_async()
            .await;

        let health = client(&server, 3).health(&CancellationToken::new()).await;

        assert!(health.reachable);
        assert!(health.model_available);
        assert!(health.error.is_none());
    }

    #[tokio::test]
    async fn health_reports_unreachable_endpoint() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(503)
            .create_async()
            .await;

        let health = client(&server, 3).health(&CancellationToken::new()).await;

        assert!(!health.reachable);
        assert!(!health.model_available);
    }

    #[test]
    fn zero_vector_detection() {
        assert!(is_zero_vector(&[0.0, 0.0]));
        assert!(!is_zero_vector(&[0.0, 0.1]));
    }
}
