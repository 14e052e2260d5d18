//! Core traits for graph database abstraction.
//!
//! - [`CypherExecutor`] - run Cypher with bound parameters
//! - [`Transaction`] - explicit commit/rollback
//! - [`GraphClient`] - long-lived connection handle that opens transactions

use async_trait::async_trait;

use crate::error::AppError;
use crate::graph::row::{Params, RowStream};

/// Executes Cypher queries against a graph database.
///
/// Implemented by both clients (auto-commit) and transactions.
#[async_trait]
pub trait CypherExecutor: Send + Sync {
    /// Executes a Cypher query and returns a stream of result rows.
    async fn execute_cypher(&self, cypher: &str, params: Params)
        -> Result<RowStream<'_>, AppError>;

    /// Executes a Cypher query, discarding any results.
    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError>;
}

/// Transaction lifecycle management.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits the transaction. Consumes it.
    async fn commit(self) -> Result<(), AppError>;

    /// Rolls back the transaction. Consumes it.
    async fn rollback(self) -> Result<(), AppError>;
}

/// A graph database client that can begin transactions.
///
/// Clients are shared process-wide and must be safe for concurrent use;
/// isolation between concurrent writers is left to the database's own
/// transaction model.
#[async_trait]
pub trait GraphClient: CypherExecutor {
    /// The transaction type returned by this client.
    type Tx<'a>: Transaction + CypherExecutor
    where
        Self: 'a;

    /// Begins a new write transaction.
    ///
    /// ```ignore
    /// let txn = client.begin().await?;
    /// txn.run_cypher("MERGE (f:File {name: $name, context: $context})", params).await?;
    /// txn.commit().await?;
    /// ```
    async fn begin(&self) -> Result<Self::Tx<'_>, AppError>;

    /// Name of the database this client is bound to.
    fn database(&self) -> &str;
}
