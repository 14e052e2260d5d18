//! Routes each workspace to its graph database.
//!
//! When the server can create databases (Neo4j Enterprise), each workspace
//! gets a dedicated database. Otherwise every workspace shares the default
//! database and isolation relies on `$context` filtering alone. The
//! capability is detected once, never configured.
//!
//! The routing decision for a workspace is made once per process and then
//! kept: a workspace downgraded to the shared database stays there, so its
//! nodes never end up split across two databases.

use std::collections::HashMap;

use tokio::sync::{OnceCell, RwLock};

use crate::config::Neo4jConfig;
use crate::error::AppError;
use crate::graph::backends::neo4j::Neo4jClient;
use crate::graph::workspace::WorkspaceGraph;
use crate::graph::{Graph, GraphClient, QueryExt};
use crate::models::{IsolationMode, Workspace, DATABASE_PREFIX};

const SYSTEM_DATABASE: &str = "system";

/// Where a workspace's nodes live.
#[derive(Clone)]
enum Route {
    Dedicated(Graph<Neo4jClient>),
    Shared,
}

/// Process-wide graph connections, one per database in use.
pub struct GraphRouter {
    config: Neo4jConfig,
    shared: Graph<Neo4jClient>,
    multi_database: OnceCell<bool>,
    system: OnceCell<Neo4jClient>,
    routes: RwLock<HashMap<Workspace, Route>>,
    /// Dedicated databases by name, including ones provisioned by other
    /// processes and discovered through `SHOW DATABASES`.
    dedicated: RwLock<HashMap<String, Graph<Neo4jClient>>>,
}

impl GraphRouter {
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, AppError> {
        let client = Neo4jClient::connect(config, None).await?;
        Ok(Self {
            config: config.clone(),
            shared: Graph::new(client),
            multi_database: OnceCell::new(),
            system: OnceCell::new(),
            routes: RwLock::new(HashMap::new()),
            dedicated: RwLock::new(HashMap::new()),
        })
    }

    /// The default database, shared by workspaces without their own.
    pub fn shared(&self) -> &Graph<Neo4jClient> {
        &self.shared
    }

    /// Whether the server supports creating databases. Checked once.
    pub async fn supports_databases(&self) -> bool {
        *self
            .multi_database
            .get_or_init(|| async {
                let components = self
                    .shared
                    .query("CALL dbms.components() YIELD edition RETURN edition")
                    .fetch_one()
                    .await;

                match components {
                    Ok(Some(row)) => {
                        let edition: String = row.get_or_default("edition");
                        tracing::info!(edition = %edition, "Detected Neo4j edition");
                        edition.eq_ignore_ascii_case("enterprise")
                    }
                    Ok(None) => false,
                    Err(err) => {
                        tracing::warn!(error = %err, "Could not detect Neo4j edition");
                        false
                    }
                }
            })
            .await
    }

    /// Returns the workspace's graph, provisioning its database on first use.
    ///
    /// Provisioning is idempotent (`IF NOT EXISTS`). A failure to create the
    /// database downgrades that workspace to the shared database for the rest
    /// of the process.
    pub async fn workspace(&self, workspace: &Workspace) -> Result<WorkspaceGraph, AppError> {
        if let Some(route) = self.routes.read().await.get(workspace) {
            return Ok(self.graph_for(workspace, route.clone()));
        }

        let mut routes = self.routes.write().await;
        // Another request may have routed it while we waited for the lock.
        if let Some(route) = routes.get(workspace) {
            return Ok(self.graph_for(workspace, route.clone()));
        }

        let route = self.route(workspace).await?;
        routes.insert(workspace.clone(), route.clone());
        Ok(self.graph_for(workspace, route))
    }

    /// Every database that may hold workspace data: the shared one first,
    /// then each dedicated database on the server.
    pub async fn databases(&self) -> Vec<Graph<Neo4jClient>> {
        if self.supports_databases().await {
            if let Err(err) = self.discover().await {
                tracing::warn!(error = %err, "Could not list workspace databases; using known ones");
            }
        }

        let mut graphs = vec![self.shared.clone()];
        graphs.extend(self.dedicated.read().await.values().cloned());
        graphs
    }

    async fn route(&self, workspace: &Workspace) -> Result<Route, AppError> {
        if !self.supports_databases().await {
            return Ok(Route::Shared);
        }

        let name = workspace.database_name();
        workspace.ensure_owns(&name)?;

        if let Some(graph) = self.dedicated.read().await.get(&name) {
            return Ok(Route::Dedicated(graph.clone()));
        }

        match self.create_database(&name).await {
            Ok(graph) => {
                tracing::info!(workspace = %workspace, database = %name, "Provisioned workspace database");
                self.dedicated.write().await.insert(name, graph.clone());
                Ok(Route::Dedicated(graph))
            }
            Err(err) => {
                tracing::warn!(
                    workspace = %workspace,
                    error = %err,
                    "Dedicated database unavailable, using shared database with context filtering"
                );
                Ok(Route::Shared)
            }
        }
    }

    fn graph_for(&self, workspace: &Workspace, route: Route) -> WorkspaceGraph {
        match route {
            Route::Dedicated(graph) => {
                WorkspaceGraph::new(graph, workspace.clone(), IsolationMode::Database)
            }
            Route::Shared => WorkspaceGraph::new(
                self.shared.clone(),
                workspace.clone(),
                IsolationMode::SharedFiltered,
            ),
        }
    }

    async fn system(&self) -> Result<&Neo4jClient, AppError> {
        self.system
            .get_or_try_init(|| Neo4jClient::connect(&self.config, Some(SYSTEM_DATABASE)))
            .await
    }

    async fn create_database(&self, name: &str) -> Result<Graph<Neo4jClient>, AppError> {
        self.system()
            .await?
            .query("CREATE DATABASE $name IF NOT EXISTS WAIT")
            .param("name", name)
            .run()
            .await?;

        let client = Neo4jClient::connect(&self.config, Some(name)).await?;
        Ok(Graph::new(client))
    }

    /// Connects to workspace databases created before this process started.
    async fn discover(&self) -> Result<(), AppError> {
        let rows = self
            .system()
            .await?
            .query(
                "SHOW DATABASES YIELD name WHERE name STARTS WITH $prefix
                 RETURN DISTINCT name",
            )
            .param("prefix", DATABASE_PREFIX)
            .fetch_all()
            .await?;

        for row in rows {
            let name: String = row.get("name")?;
            if self.dedicated.read().await.contains_key(&name) {
                continue;
            }
            let client = Neo4jClient::connect(&self.config, Some(&name)).await?;
            tracing::debug!(database = %name, "Discovered workspace database");
            self.dedicated
                .write()
                .await
                .entry(name)
                .or_insert_with(|| Graph::new(client));
        }
        Ok(())
    }
}
