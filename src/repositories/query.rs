//! Query repository for graph traversal and search operations.
//!
//! Workspace-bound queries go through [`WorkspaceGraph`], which binds and
//! enforces `$context`. The cross-workspace variants (no context given) run
//! unscoped on every database in use and keep each result inside a single
//! workspace by comparing node contexts.

use std::collections::HashSet;

use crate::context::{AppGraphs, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::graph::backends::neo4j::Neo4jClient;
use crate::graph::{Graph, GraphClient, Row, WorkspaceGraph};
use crate::models::{DependencyCycle, DependencyLink, ImpactedEntity, TextMatch, Workspace};

use super::schema::FULLTEXT_INDEX;

/// Longest `USES` run explored on each side of a cycle.
const CYCLE_SEGMENT_DEPTH: u32 = 5;

/// Raw cycle paths fetched per requested cycle. Every cycle comes back once
/// per rotation and per split point, so the raw limit is a multiple.
const CYCLE_OVERFETCH: usize = 8;

/// Cypher predicate: no node repeats on `p` apart from the closing `c1`.
const SIMPLE_CYCLE: &str =
    "size(reduce(seen = [], n IN nodes(p)[1..] | CASE WHEN n IN seen THEN seen ELSE seen + n END)) = size(nodes(p)) - 1";

/// Repository for traversal and search queries.
#[derive(FromContext, Clone)]
pub struct QueryRepository {
    graphs: AppGraphs,
}

impl QueryRepository {
    /// Finds the workspace that owns a class or interface named `name`.
    ///
    /// Looks through every database in use; the first match wins.
    pub async fn resolve_workspace(&self, name: &str) -> Result<Option<Workspace>, AppError> {
        for graph in self.graphs.databases().await {
            let row = graph
                .query(
                    "MATCH (c) WHERE c.name = $name AND (c:Class OR c:Interface)
                     RETURN c.context AS context
                     LIMIT 1",
                )
                .param("name", name)
                .fetch_one()
                .await?;

            let context = row.and_then(|r| r.get_opt::<String>("context").ok().flatten());
            if let Some(context) = context {
                match context.parse::<Workspace>() {
                    Ok(workspace) => return Ok(Some(workspace)),
                    Err(err) => {
                        tracing::debug!(context = %context, error = %err, "Skipping node with invalid context");
                    }
                }
            }
        }
        Ok(None)
    }

    /// Entities that transitively depend on `class_name` through inbound
    /// `INHERITS` or `USES` edges, nearest first.
    ///
    /// A class that does not exist yields an empty result.
    pub async fn impact_analysis(
        &self,
        graph: &WorkspaceGraph,
        class_name: &str,
        max_depth: u32,
        limit: usize,
    ) -> Result<Vec<ImpactedEntity>, AppError> {
        let cypher = format!(
            "MATCH (target {{name: $name, context: $context}})
             WHERE target:Class OR target:Interface OR target:Reference
             MATCH p = (dependent)-[:INHERITS|USES*1..{max_depth}]->(target)
             WHERE dependent <> target
               AND all(n IN nodes(p) WHERE n.context = $context)
             WITH dependent, min(length(p)) AS distance
             RETURN dependent.name AS name,
                    coalesce(dependent.kind, toLower(head(labels(dependent)))) AS kind,
                    coalesce(dependent.file_path, '') AS file_path,
                    distance
             ORDER BY distance, name
             LIMIT $limit",
            max_depth = max_depth.max(1)
        );

        let rows = graph
            .query(&cypher)
            .param("name", class_name)
            .param("limit", limit as i64)
            .fetch_all()
            .await?;

        rows.iter().map(impacted_entity).collect()
    }

    /// Targets reachable from `class_name` through outbound `USES` edges,
    /// ordered by shortest path length and deduplicated by name.
    pub async fn dependency_chain(
        &self,
        graph: &WorkspaceGraph,
        class_name: &str,
        max_depth: u32,
    ) -> Result<Vec<DependencyLink>, AppError> {
        let cypher = format!(
            "MATCH (source {{name: $name, context: $context}})
             MATCH p = (source)-[:USES*1..{max_depth}]->(dependency)
             WHERE dependency <> source
               AND all(n IN nodes(p) WHERE n.context = $context)
             WITH dependency, min(length(p)) AS depth
             RETURN dependency.name AS name,
                    coalesce(dependency.file_path, '') AS file_path,
                    depth
             ORDER BY depth, name",
            max_depth = max_depth.max(1)
        );

        let rows = graph
            .query(&cypher)
            .param("name", class_name)
            .fetch_all()
            .await?;

        let mut seen = HashSet::new();
        let mut links = Vec::with_capacity(rows.len());
        for row in &rows {
            let link = DependencyLink {
                name: row.get("name")?,
                file_path: row.get_or_default("file_path"),
                depth: row.get("depth")?,
            };
            if seen.insert(link.name.clone()) {
                links.push(link);
            }
        }
        Ok(links)
    }

    /// Class-level `USES` cycles inside one workspace.
    pub async fn find_cycles(
        &self,
        graph: &WorkspaceGraph,
        limit: usize,
    ) -> Result<Vec<DependencyCycle>, AppError> {
        let cypher = format!(
            "MATCH p = (c1:Class {{context: $context}})-[:USES*1..{depth}]->(c2:Class)-[:USES*1..{depth}]->(c1)
             WHERE c1 <> c2
               AND all(n IN nodes(p) WHERE n.context = $context)
               AND {simple}
             RETURN [n IN nodes(p) | n.name] AS cycle
             LIMIT $raw_limit",
            depth = CYCLE_SEGMENT_DEPTH,
            simple = SIMPLE_CYCLE
        );

        let rows = graph
            .query(&cypher)
            .param("raw_limit", raw_cycle_limit(limit))
            .fetch_all()
            .await?;

        let context = graph.workspace().as_str();
        let paths = rows
            .iter()
            .map(|row| -> Result<(String, Vec<String>), AppError> {
                Ok((context.to_string(), row.get("cycle")?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(collect_cycles(paths, limit))
    }

    /// Class-level `USES` cycles across all workspaces. Every node of a
    /// reported cycle shares one context.
    pub async fn find_cycles_all(&self, limit: usize) -> Result<Vec<DependencyCycle>, AppError> {
        let cypher = format!(
            "MATCH p = (c1:Class)-[:USES*1..{depth}]->(c2:Class)-[:USES*1..{depth}]->(c1)
             WHERE c1 <> c2
               AND c1.context IS NOT NULL
               AND c1.context = c2.context
               AND all(n IN nodes(p) WHERE n.context = c1.context)
               AND {simple}
             RETURN c1.context AS context, [n IN nodes(p) | n.name] AS cycle
             LIMIT $raw_limit",
            depth = CYCLE_SEGMENT_DEPTH,
            simple = SIMPLE_CYCLE
        );

        let mut paths = Vec::new();
        for graph in self.graphs.databases().await {
            let rows = graph
                .query(&cypher)
                .param("raw_limit", raw_cycle_limit(limit))
                .fetch_all()
                .await?;
            for row in &rows {
                paths.push((row.get::<String>("context")?, row.get::<Vec<String>>("cycle")?));
            }
        }

        Ok(collect_cycles(paths, limit))
    }

    /// Full-text search inside one workspace.
    ///
    /// Uses the full-text index; if the index is missing or the query fails,
    /// falls back to a case-insensitive substring match.
    pub async fn full_text(
        &self,
        graph: &WorkspaceGraph,
        text: &str,
        limit: usize,
    ) -> Result<Vec<TextMatch>, AppError> {
        let indexed = graph
            .query(
                "CALL db.index.fulltext.queryNodes($index, $search) YIELD node, score
                 WHERE node.context = $context
                 RETURN node.name AS name,
                        coalesce(node.kind, toLower(head(labels(node)))) AS kind,
                        coalesce(node.file_path, '') AS file_path,
                        node.context AS context,
                        score
                 ORDER BY score DESC
                 LIMIT $limit",
            )
            .param("index", FULLTEXT_INDEX)
            .param("search", escape_lucene(text))
            .param("limit", limit as i64)
            .fetch_all()
            .await;

        let rows = match indexed {
            Ok(rows) => rows,
            Err(AppError::Query { message, .. }) => {
                tracing::warn!(
                    workspace = %graph.workspace(),
                    error = %message,
                    "Full-text index unavailable, falling back to substring match"
                );
                graph
                    .query(
                        "MATCH (node) WHERE node.context = $context
                           AND NOT node:Reference
                           AND (toLower(coalesce(node.name, '')) CONTAINS $needle
                             OR toLower(coalesce(node.content, '')) CONTAINS $needle
                             OR toLower(coalesce(node.file_path, '')) CONTAINS $needle)
                         RETURN node.name AS name,
                                coalesce(node.kind, toLower(head(labels(node)))) AS kind,
                                coalesce(node.file_path, '') AS file_path,
                                node.context AS context,
                                null AS score
                         ORDER BY name
                         LIMIT $limit",
                    )
                    .param("needle", text.to_lowercase())
                    .param("limit", limit as i64)
                    .fetch_all()
                    .await?
            }
            Err(err) => return Err(err),
        };

        rows.iter().map(text_match).collect()
    }

    /// Full-text search across all workspaces, best matches first.
    pub async fn full_text_all(&self, text: &str, limit: usize) -> Result<Vec<TextMatch>, AppError> {
        let mut matches = Vec::new();
        for graph in self.graphs.databases().await {
            matches.extend(full_text_unscoped(&graph, text, limit).await?);
        }

        matches.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
                .then_with(|| a.name.cmp(&b.name))
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

async fn full_text_unscoped(
    graph: &Graph<Neo4jClient>,
    text: &str,
    limit: usize,
) -> Result<Vec<TextMatch>, AppError> {
    let indexed = graph
        .query(
            "CALL db.index.fulltext.queryNodes($index, $search) YIELD node, score
             WHERE node.context IS NOT NULL
             RETURN node.name AS name,
                    coalesce(node.kind, toLower(head(labels(node)))) AS kind,
                    coalesce(node.file_path, '') AS file_path,
                    node.context AS context,
                    score
             ORDER BY score DESC
             LIMIT $limit",
        )
        .param("index", FULLTEXT_INDEX)
        .param("search", escape_lucene(text))
        .param("limit", limit as i64)
        .fetch_all()
        .await;

    let rows = match indexed {
        Ok(rows) => rows,
        Err(AppError::Query { message, .. }) => {
            tracing::warn!(
                database = graph.client().database(),
                error = %message,
                "Full-text index unavailable, falling back to substring match"
            );
            graph
                .query(
                    "MATCH (node) WHERE node.context IS NOT NULL
                       AND NOT node:Reference
                       AND (toLower(coalesce(node.name, '')) CONTAINS $needle
                         OR toLower(coalesce(node.content, '')) CONTAINS $needle
                         OR toLower(coalesce(node.file_path, '')) CONTAINS $needle)
                     RETURN node.name AS name,
                            coalesce(node.kind, toLower(head(labels(node)))) AS kind,
                            coalesce(node.file_path, '') AS file_path,
                            node.context AS context,
                            null AS score
                     ORDER BY name
                     LIMIT $limit",
                )
                .param("needle", text.to_lowercase())
                .param("limit", limit as i64)
                .fetch_all()
                .await?
        }
        Err(err) => return Err(err),
    };

    rows.iter().map(text_match).collect()
}

fn impacted_entity(row: &Row) -> Result<ImpactedEntity, AppError> {
    Ok(ImpactedEntity {
        name: row.get("name")?,
        kind: row.get_or_default("kind"),
        file_path: row.get_or_default("file_path"),
        distance: row.get("distance")?,
    })
}

fn text_match(row: &Row) -> Result<TextMatch, AppError> {
    Ok(TextMatch {
        name: row.get_or_default("name"),
        kind: row.get_or_default("kind"),
        file_path: row.get_or_default("file_path"),
        context: row.get("context")?,
        score: row.get_opt("score")?,
    })
}

fn raw_cycle_limit(limit: usize) -> i64 {
    limit.saturating_mul(CYCLE_OVERFETCH).max(1) as i64
}

/// Normalizes raw cycle paths, drops rotations and duplicates, and keeps the
/// first `limit` distinct cycles.
fn collect_cycles(paths: Vec<(String, Vec<String>)>, limit: usize) -> Vec<DependencyCycle> {
    let mut seen = HashSet::new();
    let mut cycles = Vec::new();
    for (context, path) in paths {
        let Some(cycle) = DependencyCycle::normalized(context, path) else {
            continue;
        };
        if seen.insert(cycle.clone()) {
            cycles.push(cycle);
            if cycles.len() == limit {
                break;
            }
        }
    }
    cycles
}

/// Escapes characters that are operators in Lucene query syntax.
///
/// `&&` and `||` are escaped as pairs; a lone `&` or `|` is literal.
pub fn escape_lucene(input: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
    ];

    let mut escaped = String::with_capacity(input.len() * 2);
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' | '|' if chars.peek() == Some(&c) => {
                chars.next();
                escaped.push('\\');
                escaped.push(c);
                escaped.push('\\');
                escaped.push(c);
            }
            c if SPECIAL.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}
