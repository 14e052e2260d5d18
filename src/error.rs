//! Application error types with JSON-RPC code mapping.

use rmcp::model::ErrorCode;
use thiserror::Error;

/// Application-level errors for codevault.
#[derive(Error, Debug)]
pub enum AppError {
    // Graph store errors
    #[error("Neo4j connection error: {0}")]
    Connection(#[from] neo4rs::Error),

    #[error("Neo4j query error: {message}")]
    Query { message: String, query: String },

    #[error("Query is not scoped to a workspace: {0}")]
    UnscopedQuery(String),

    // HTTP collaborators (vector store, embedding endpoint)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    // Workspace errors
    #[error("Invalid workspace name: {0}")]
    InvalidWorkspace(String),

    #[error("Collection '{collection}' is not prefixed by workspace '{workspace}'")]
    InvalidCollection {
        collection: String,
        workspace: String,
    },

    // Request errors
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the failure is worth retrying (network, timeout, overloaded store).
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Connection(err) => {
                matches!(
                    err,
                    neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError
                ) || err.to_string().contains("TransientError")
            }
            AppError::Http(err) => err.is_timeout() || err.is_connect(),
            AppError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// JSON-RPC error code for this error.
    pub fn rpc_code(&self) -> i32 {
        let code = match self {
            AppError::InvalidParams(_)
            | AppError::Validation(_)
            | AppError::InvalidWorkspace(_)
            | AppError::InvalidCollection { .. } => ErrorCode::INVALID_PARAMS,
            _ => ErrorCode::INTERNAL_ERROR,
        };
        code.0
    }
}

impl From<neo4rs::DeError> for AppError {
    fn from(err: neo4rs::DeError) -> Self {
        AppError::Internal(format!("failed to decode graph row: {}", err))
    }
}
