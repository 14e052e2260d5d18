//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/codevault/config.toml` (XDG) or platform config dir
//! 2. Project config: `.codevault.toml`
//! 3. Environment variables: `CODEVAULT_*`, nested with `__`
//!    (e.g. `CODEVAULT_NEO4J__URI`, `CODEVAULT_QDRANT__API_KEY`)
//!
//! Every field has a default, so an empty configuration connects to local
//! Neo4j, Qdrant and Ollama instances.
//!
//! ```toml
//! [neo4j]
//! uri = "bolt://graph.internal:7687"
//! password = "secret"
//!
//! [qdrant]
//! url = "http://vectors.internal:6333"
//! vector_size = 1024
//!
//! [embedding]
//! url = "http://embeddings.internal:11434"
//! model = "mxbai-embed-large"
//! dimensions = 1024
//! ```

use std::ops::Deref;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Bolt URI, e.g. `bolt://localhost:7687`.
    pub uri: String,
    pub user: String,
    pub password: Option<String>,
    /// Default database. `None` uses the server's home database.
    pub database: Option<String>,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: None,
            database: None,
        }
    }
}

/// Qdrant REST settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// REST base URL (port 6333, not the gRPC port).
    pub url: String,
    /// Sent as the `api-key` header when set.
    pub api_key: Option<String>,
    /// Dimension of every collection's vectors. Must match `embedding.dimensions`.
    pub vector_size: usize,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            vector_size: 1024,
            timeout_secs: 30,
        }
    }
}

/// Embedding endpoint settings (Ollama-compatible API).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    /// Length of every returned vector, also the size of the zero-vector sentinel.
    pub dimensions: usize,
    /// Inputs longer than this many characters are truncated before sending.
    pub max_input_chars: usize,
    /// Number of texts embedded concurrently per batch.
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "mxbai-embed-large".to_string(),
            dimensions: 1024,
            max_input_chars: 8192,
            batch_size: 32,
            timeout_secs: 60,
        }
    }
}

/// Retry policy for store and embedding calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay_ms * 2^n`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Limits and thresholds for queries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    /// Minimum similarity score for semantic hits.
    pub min_score: f32,
    /// Cap on impact-analysis results.
    pub impact_limit: usize,
    /// Cap on reported dependency cycles.
    pub cycle_limit: usize,
    /// Upper bound accepted for dependency-chain depth.
    pub max_dependency_depth: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_score: 0.5,
            impact_limit: 100,
            cycle_limit: 50,
            max_dependency_depth: 10,
        }
    }
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    fn figment() -> Figment {
        Figment::new()
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(Self::user_config_path()))
            // Layer 2: Project config
            .merge(Toml::file(".codevault.toml"))
            // Layer 3: Environment variables (highest priority)
            .merge(Env::prefixed("CODEVAULT_").split("__"))
    }

    /// User config path: ~/.config/codevault/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("codevault").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("codevault").join("config.toml"))
            .unwrap_or_default()
    }
}
