//! Node and relationship writes.

use serde_json::{Map, Value as JsonValue};

use crate::context::{AppGraphs, Context};
use crate::cypher;
use crate::di::FromContext;
use crate::error::AppError;
use crate::graph::{ScopedTransaction, WorkspaceGraph};
use crate::models::{CodeMemory, EntityKind, Relationship, Workspace};

/// Labels a relationship endpoint may resolve to, besides `Reference`.
const ENDPOINT_LABELS: &[&str] = &["Class", "Method", "File", "Interface", "Property", "Pattern"];

/// Counts from one write batch.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct WriteCounts {
    pub nodes: usize,
    pub relationships: usize,
}

/// Repository for graph writes.
#[derive(FromContext, Clone)]
pub struct MemoryRepository {
    graphs: AppGraphs,
}

impl MemoryRepository {
    pub async fn graph(&self, workspace: &Workspace) -> Result<WorkspaceGraph, AppError> {
        self.graphs.workspace(workspace).await
    }

    /// Writes a batch in one transaction, nodes first in submission order,
    /// then relationships.
    ///
    /// File, Class, Interface and Pattern nodes are merged; Method and
    /// Property nodes are always created. Any failure rolls the whole batch
    /// back.
    pub async fn store(
        &self,
        graph: &WorkspaceGraph,
        memories: &[CodeMemory],
        relationships: &[Relationship],
    ) -> Result<WriteCounts, AppError> {
        let txn = graph.begin().await?;

        let result = async {
            let mut counts = WriteCounts::default();
            for memory in memories {
                write_node(&txn, memory).await?;
                counts.nodes += 1;
            }
            for relationship in relationships {
                write_relationship(&txn, relationship).await?;
                counts.relationships += 1;
            }
            Ok::<_, AppError>(counts)
        }
        .await;

        match result {
            Ok(counts) => {
                txn.commit().await?;
                tracing::debug!(
                    workspace = %graph.workspace(),
                    nodes = counts.nodes,
                    relationships = counts.relationships,
                    "Stored graph batch"
                );
                Ok(counts)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Removes every node tagged with `file_path`, whatever its kind,
    /// together with its relationships. Returns the number of nodes removed.
    pub async fn delete_by_file_path(
        &self,
        graph: &WorkspaceGraph,
        file_path: &str,
    ) -> Result<i64, AppError> {
        let row = cypher!(
            graph,
            "MATCH (n {file_path: $file_path}) WHERE n.context = $context
             DETACH DELETE n
             RETURN count(*) AS deleted",
            file_path = file_path,
        )
        .fetch_one()
        .await?;

        Ok(row.map(|r| r.get_or_default("deleted")).unwrap_or_default())
    }
}

async fn write_node(txn: &ScopedTransaction, memory: &CodeMemory) -> Result<(), AppError> {
    let props = JsonValue::Object(memory.properties());
    let label = memory.kind.label();

    let query = match memory.kind {
        EntityKind::Pattern => {
            let id = memory
                .pattern
                .as_ref()
                .map(|p| p.id.clone())
                .ok_or_else(|| {
                    AppError::Validation(format!("pattern '{}' has no pattern details", memory.name))
                })?;
            txn.query(
                "MERGE (n:Pattern {id: $id, context: $context})
                 SET n += $props",
            )
            .param("id", id)
        }
        kind if kind.is_merged() => txn
            .query(&format!(
                "MERGE (n:{label} {{name: $name, context: $context}})
                 SET n += $props"
            ))
            .param("name", &memory.name),
        _ => txn.query(&format!(
            "CREATE (n:{label} {{context: $context}})
             SET n += $props"
        )),
    };

    query.param_raw("props", props).run().await
}

/// Builds the relationship statement. The type comes from a closed enum, so
/// formatting it into the query is safe.
fn relationship_cypher(relationship: &Relationship) -> String {
    let rel_type = relationship.rel_type.as_cypher();
    format!(
        "OPTIONAL MATCH (s) WHERE s.name = $from AND s.context = $context
           AND any(l IN labels(s) WHERE l IN $labels)
         WITH head(collect(s)) AS src
         OPTIONAL MATCH (t) WHERE t.name = $to AND t.context = $context
           AND any(l IN labels(t) WHERE l IN $labels)
         WITH src, head(collect(t)) AS dst
         FOREACH (_ IN CASE WHEN src IS NULL THEN [1] ELSE [] END |
           MERGE (:Reference {{name: $from, context: $context}}))
         FOREACH (_ IN CASE WHEN dst IS NULL THEN [1] ELSE [] END |
           MERGE (:Reference {{name: $to, context: $context}}))
         WITH src, dst
         OPTIONAL MATCH (rs:Reference {{name: $from, context: $context}})
         OPTIONAL MATCH (rt:Reference {{name: $to, context: $context}})
         WITH coalesce(src, rs) AS a, coalesce(dst, rt) AS b
         MERGE (a)-[r:{rel_type} {{context: $context}}]->(b)
         SET r += $props"
    )
}

/// Merges an edge, creating `Reference` placeholders for unresolved
/// endpoints so the edge is never dropped.
async fn write_relationship(
    txn: &ScopedTransaction,
    relationship: &Relationship,
) -> Result<(), AppError> {
    let props: Map<String, JsonValue> = relationship
        .properties
        .iter()
        .filter(|(key, _)| key.as_str() != "context")
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();

    txn.query(&relationship_cypher(relationship))
        .param("from", &relationship.from)
        .param("to", &relationship.to)
        .param("labels", ENDPOINT_LABELS)
        .param_raw("props", JsonValue::Object(props))
        .run()
        .await
}
