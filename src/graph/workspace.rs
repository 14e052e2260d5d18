//! Workspace-scoped access to a graph database.
//!
//! Every query issued through [`WorkspaceGraph`] or [`ScopedTransaction`] is
//! bound to the workspace via `$context` and refused if it never filters on
//! it. This holds in both isolation modes, so the shared-database fallback
//! behaves exactly like a dedicated database to callers.

use crate::error::AppError;
use crate::graph::backends::neo4j::{Neo4jClient, Neo4jTransaction};
use crate::graph::{Graph, GraphClient, Query, Transaction};
use crate::models::{IsolationMode, Workspace};

/// A graph handle bound to one workspace.
#[derive(Clone)]
pub struct WorkspaceGraph {
    graph: Graph<Neo4jClient>,
    workspace: Workspace,
    mode: IsolationMode,
}

impl WorkspaceGraph {
    pub fn new(graph: Graph<Neo4jClient>, workspace: Workspace, mode: IsolationMode) -> Self {
        Self {
            graph,
            workspace,
            mode,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn database(&self) -> &str {
        self.graph.client().database()
    }

    /// Creates a scoped auto-commit query.
    pub fn query(&self, cypher: &str) -> Query<'_, Neo4jClient> {
        self.graph.query(cypher).scoped(self.workspace.as_str())
    }

    /// Begins a scoped write transaction.
    pub async fn begin(&self) -> Result<ScopedTransaction, AppError> {
        let txn = self.graph.begin().await?;
        Ok(ScopedTransaction {
            txn,
            context: self.workspace.as_str().to_string(),
        })
    }

    /// The unscoped graph, for statements that carry no tenant data
    /// (schema, health checks).
    pub fn unscoped(&self) -> &Graph<Neo4jClient> {
        &self.graph
    }
}

/// A write transaction whose queries are bound to one workspace.
pub struct ScopedTransaction {
    txn: Neo4jTransaction,
    context: String,
}

impl ScopedTransaction {
    pub fn query(&self, cypher: &str) -> Query<'_, Neo4jTransaction> {
        Query::new(&self.txn, cypher).scoped(&self.context)
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.txn.commit().await
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.txn.rollback().await
    }
}
