//! Constraints, indexes and the full-text index.

use crate::error::AppError;
use crate::graph::backends::neo4j::Neo4jClient;
use crate::graph::{Graph, GraphClient};

/// Name of the full-text index over name, content and summary.
pub const FULLTEXT_INDEX: &str = "code_search";

/// Schema statements, all idempotent.
///
/// Uniqueness is per workspace: `(name, context)` for merged kinds,
/// `(id, context)` for patterns.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT class_name_context IF NOT EXISTS FOR (n:Class) REQUIRE (n.name, n.context) IS UNIQUE",
    "CREATE CONSTRAINT file_name_context IF NOT EXISTS FOR (n:File) REQUIRE (n.name, n.context) IS UNIQUE",
    "CREATE CONSTRAINT interface_name_context IF NOT EXISTS FOR (n:Interface) REQUIRE (n.name, n.context) IS UNIQUE",
    "CREATE CONSTRAINT reference_name_context IF NOT EXISTS FOR (n:Reference) REQUIRE (n.name, n.context) IS UNIQUE",
    "CREATE CONSTRAINT pattern_id_context IF NOT EXISTS FOR (n:Pattern) REQUIRE (n.id, n.context) IS UNIQUE",
    "CREATE INDEX class_context IF NOT EXISTS FOR (n:Class) ON (n.context)",
    "CREATE INDEX method_context IF NOT EXISTS FOR (n:Method) ON (n.context)",
    "CREATE INDEX method_name IF NOT EXISTS FOR (n:Method) ON (n.name)",
    "CREATE INDEX method_file_path IF NOT EXISTS FOR (n:Method) ON (n.file_path)",
    "CREATE INDEX property_file_path IF NOT EXISTS FOR (n:Property) ON (n.file_path)",
    "CREATE INDEX class_file_path IF NOT EXISTS FOR (n:Class) ON (n.file_path)",
    "CREATE INDEX file_path IF NOT EXISTS FOR (n:File) ON (n.file_path)",
    "CREATE INDEX pattern_context IF NOT EXISTS FOR (n:Pattern) ON (n.context)",
    "CREATE INDEX pattern_type IF NOT EXISTS FOR (n:Pattern) ON (n.pattern_type)",
    "CREATE FULLTEXT INDEX code_search IF NOT EXISTS FOR (n:File|Class|Method|Property|Interface|Pattern) ON EACH [n.name, n.content, n.summary]",
];

/// Outcome of [`SchemaRepository::ensure`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchemaReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Applies the schema to one database.
pub struct SchemaRepository<'a> {
    graph: &'a Graph<Neo4jClient>,
}

impl<'a> SchemaRepository<'a> {
    pub fn new(graph: &'a Graph<Neo4jClient>) -> Self {
        Self { graph }
    }

    /// Creates every constraint and index that does not exist yet.
    ///
    /// Failures are logged and skipped: an equivalent index under another
    /// name, or an edition without composite constraints, must not prevent
    /// the rest of the schema from being applied.
    pub async fn ensure(&self) -> SchemaReport {
        let mut report = SchemaReport::default();
        for statement in SCHEMA_STATEMENTS {
            match self.graph.query(statement).run().await {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    report.skipped += 1;
                    tracing::warn!(
                        database = self.graph.client().database(),
                        statement,
                        error = %err,
                        "Schema statement skipped"
                    );
                }
            }
        }
        tracing::info!(
            database = self.graph.client().database(),
            applied = report.applied,
            skipped = report.skipped,
            "Schema ensured"
        );
        report
    }

    /// Whether the full-text index exists and is online.
    pub async fn fulltext_ready(&self) -> Result<bool, AppError> {
        let row = self
            .graph
            .query("SHOW INDEXES YIELD name, state WHERE name = $name RETURN state")
            .param("name", FULLTEXT_INDEX)
            .fetch_one()
            .await?;
        Ok(row
            .and_then(|r| r.get_opt::<String>("state").ok().flatten())
            .is_some_and(|state| state.eq_ignore_ascii_case("ONLINE")))
    }
}
