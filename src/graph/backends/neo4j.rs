//! Neo4j backend over the Bolt protocol (`neo4rs`).
//!
//! ```ignore
//! use codevault::graph::backends::neo4j::Neo4jClient;
//! use codevault::graph::QueryExt;
//!
//! let client = Neo4jClient::connect(&config.neo4j, None).await?;
//! let rows = client.query("RETURN 1 AS one").fetch_all().await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Txn};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::config::Neo4jConfig;
use crate::error::AppError;
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::{CypherExecutor, GraphClient, Transaction};

/// Database used when the configuration names none.
pub const DEFAULT_DATABASE: &str = "neo4j";

/// Neo4j graph client bound to one database.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct Neo4jClient {
    graph: neo4rs::Graph,
    database: Arc<str>,
}

impl Neo4jClient {
    /// Connects to `database`, or to the configured default database when `None`.
    pub async fn connect(config: &Neo4jConfig, database: Option<&str>) -> Result<Self, AppError> {
        let database = database
            .or(config.database.as_deref())
            .unwrap_or(DEFAULT_DATABASE);

        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_deref().unwrap_or_default())
            .db(database)
            .build()?;

        let graph = neo4rs::Graph::connect(neo4j_config).await?;
        tracing::debug!(uri = %config.uri, database, "Connected to Neo4j");

        Ok(Self {
            graph,
            database: Arc::from(database),
        })
    }
}

#[async_trait]
impl CypherExecutor for Neo4jClient {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        let stream = self
            .graph
            .execute(build_query(cypher, params))
            .await
            .map_err(|e| query_error(e, cypher))?;

        let cypher = cypher.to_string();
        Ok(Box::pin(futures::stream::try_unfold(
            stream,
            move |mut stream| {
                let cypher = cypher.clone();
                async move {
                    match stream.next().await.map_err(|e| query_error(e, &cypher))? {
                        Some(row) => Ok(Some((convert_row(&row)?, stream))),
                        None => Ok(None),
                    }
                }
            },
        )))
    }

    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
        self.graph
            .run(build_query(cypher, params))
            .await
            .map_err(|e| query_error(e, cypher))
    }
}

#[async_trait]
impl GraphClient for Neo4jClient {
    type Tx<'a> = Neo4jTransaction;

    async fn begin(&self) -> Result<Self::Tx<'_>, AppError> {
        let txn = self.graph.start_txn().await?;
        Ok(Neo4jTransaction {
            txn: Mutex::new(txn),
        })
    }

    fn database(&self) -> &str {
        &self.database
    }
}

/// An explicit Neo4j write transaction.
///
/// Bolt transactions are single-stream, so statements are serialized
/// through a mutex and result rows are buffered before being handed out.
pub struct Neo4jTransaction {
    txn: Mutex<Txn>,
}

#[async_trait]
impl CypherExecutor for Neo4jTransaction {
    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Params,
    ) -> Result<RowStream<'_>, AppError> {
        let mut txn = self.txn.lock().await;
        let mut stream = txn
            .execute(build_query(cypher, params))
            .await
            .map_err(|e| query_error(e, cypher))?;

        let mut rows = Vec::new();
        while let Some(row) = stream
            .next(txn.handle())
            .await
            .map_err(|e| query_error(e, cypher))?
        {
            rows.push(convert_row(&row));
        }

        Ok(Box::pin(futures::stream::iter(rows)))
    }

    async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
        let mut txn = self.txn.lock().await;
        txn.run(build_query(cypher, params))
            .await
            .map_err(|e| query_error(e, cypher))
    }
}

#[async_trait]
impl Transaction for Neo4jTransaction {
    async fn commit(self) -> Result<(), AppError> {
        self.txn.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), AppError> {
        self.txn.into_inner().rollback().await?;
        Ok(())
    }
}

/// Builds a driver query, converting each JSON parameter to its Bolt form.
fn build_query(cypher: &str, params: Params) -> neo4rs::Query {
    params
        .into_iter()
        .fold(neo4rs::query(cypher), |query, (name, value)| {
            query.param(&name, to_bolt(value))
        })
}

fn to_bolt(value: JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => BoltType::from(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => BoltType::from(s),
        JsonValue::Array(items) => BoltType::List(BoltList {
            value: items.into_iter().map(to_bolt).collect(),
        }),
        JsonValue::Object(map) => BoltType::Map(BoltMap {
            value: map
                .into_iter()
                .map(|(k, v)| (BoltString::from(k), to_bolt(v)))
                .collect(),
        }),
    }
}

fn convert_row(row: &neo4rs::Row) -> Result<Row, AppError> {
    Ok(Row::new(row.to::<HashMap<String, JsonValue>>()?))
}

/// Keeps connection-level and transient server errors in
/// [`AppError::Connection`] so the retry policy sees them; everything else
/// is a query error carrying the statement.
fn query_error(err: neo4rs::Error, cypher: &str) -> AppError {
    match AppError::Connection(err) {
        err if err.is_transient() => err,
        AppError::Connection(err) => AppError::Query {
            message: err.to_string(),
            query: cypher.to_string(),
        },
        err => err,
    }
}
