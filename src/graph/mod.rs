//! Graph abstraction layer.
//!
//! - [`CypherExecutor`] - execute Cypher queries
//! - [`Transaction`] - commit/rollback
//! - [`GraphClient`] - connection handle and transaction creation
//! - [`GraphRouter`] - maps workspaces to databases
//! - [`WorkspaceGraph`] - workspace-scoped queries and transactions
//!
//! # Usage
//!
//! ```ignore
//! use codevault::graph::GraphRouter;
//!
//! let router = GraphRouter::connect(&config.neo4j).await?;
//! let ws = router.workspace(&Workspace::new("demo")?).await?;
//!
//! // `$context` is bound automatically; omitting it is an error.
//! let rows = ws.query("MATCH (c:Class {context: $context}) RETURN c.name AS name")
//!     .fetch_all()
//!     .await?;
//! ```

mod macros;
mod query;
mod router;
mod row;
mod traits;
mod workspace;

pub mod backends;

pub use query::{Query, QueryExt, CONTEXT_PARAM};
pub use router::GraphRouter;
pub use row::{Params, Row, RowStream};
pub use traits::{CypherExecutor, GraphClient, Transaction};
pub use workspace::{ScopedTransaction, WorkspaceGraph};

#[doc(inline)]
pub use crate::cypher;

use crate::error::AppError;

/// Thin wrapper over a [`GraphClient`] for auto-commit queries and explicit
/// transactions.
#[derive(Clone)]
pub struct Graph<C: GraphClient> {
    client: C,
}

impl<C: GraphClient> Graph<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Creates an auto-commit query; each executes in its own implicit
    /// transaction.
    pub fn query(&self, cypher: &str) -> Query<'_, C> {
        Query::new(&self.client, cypher)
    }

    /// Begins an explicit transaction. The caller commits or rolls back.
    pub async fn begin(&self) -> Result<C::Tx<'_>, AppError> {
        self.client.begin().await
    }
}

#[async_trait::async_trait]
impl<C: GraphClient> CypherExecutor for Graph<C> {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        self.client.execute_cypher(cypher, params).await
    }

    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
        self.client.run_cypher(cypher, params).await
    }
}
