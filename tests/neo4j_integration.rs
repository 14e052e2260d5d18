//! Integration tests for the graph side: isolation, merge semantics,
//! placeholders and traversals.
//!
//! These tests require a running Neo4j instance.
//! Run with: `cargo test --features integration --test neo4j_integration`
//!
//! Connection defaults to `bolt://localhost:7687` as `neo4j`/`password`;
//! override with `CODEVAULT_TEST_NEO4J_URI` and `CODEVAULT_TEST_NEO4J_PASSWORD`.

#![cfg(feature = "integration")]

use codevault::config::{Config, Neo4jConfig};
use codevault::context::Context;
use codevault::error::AppError;
use codevault::graph::WorkspaceGraph;
use codevault::models::{
    CodeMemory, EntityKind, IsolationMode, Relationship, RelationshipType, Workspace,
};
use codevault::repositories::{
    MemoryRepository, QueryRepository, SchemaRepository, FULLTEXT_INDEX,
};
use codevault::FromRef;
use serial_test::serial;

async fn create_context() -> Context {
    let config = Config {
        neo4j: Neo4jConfig {
            uri: std::env::var("CODEVAULT_TEST_NEO4J_URI")
                .unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            user: "neo4j".to_string(),
            password: Some(
                std::env::var("CODEVAULT_TEST_NEO4J_PASSWORD")
                    .unwrap_or_else(|_| "password".to_string()),
            ),
            database: None,
        },
        ..Config::default()
    };
    Context::from(config)
        .await
        .expect("Failed to connect to test database")
}

/// Returns a clean graph for the workspace.
async fn workspace(ctx: &Context, name: &str) -> WorkspaceGraph {
    let workspace = Workspace::new(name).expect("valid workspace");
    let graph = ctx
        .graphs
        .workspace(&workspace)
        .await
        .expect("Failed to route workspace");
    graph
        .query("MATCH (n) WHERE n.context = $context DETACH DELETE n")
        .run()
        .await
        .expect("Failed to clean workspace");
    graph
}

fn class(graph: &WorkspaceGraph, name: &str) -> CodeMemory {
    CodeMemory::new(graph.workspace().clone(), EntityKind::Class, name)
        .at(format!("src/{}.rs", name.to_lowercase()), 1)
}

fn uses(from: &str, to: &str) -> Relationship {
    Relationship::new(from, to, RelationshipType::Uses)
}

async fn count(graph: &WorkspaceGraph, cypher: &str) -> i64 {
    graph
        .query(cypher)
        .fetch_one()
        .await
        .expect("Count query failed")
        .map(|row| row.get_or_default("count"))
        .unwrap_or_default()
}

// All tests run serially: they share the default database.
#[serial]
mod graph_tests {
    use super::*;

    #[tokio::test]
    async fn test_workspaces_are_isolated() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let a = workspace(&ctx, "it_iso_a").await;
        let b = workspace(&ctx, "it_iso_b").await;
        SchemaRepository::new(a.unscoped()).ensure().await;

        memories
            .store(
                &a,
                &[class(&a, "Foo").with_content("struct Foo")],
                &[uses("Bar", "Foo")],
            )
            .await
            .expect("Store failed");

        let in_b = queries.full_text(&b, "Foo", 10).await.expect("Search failed");
        assert!(in_b.is_empty());
        let impact = queries
            .impact_analysis(&b, "Foo", 5, 100)
            .await
            .expect("Impact failed");
        assert!(impact.is_empty());
        assert_eq!(
            count(&b, "MATCH (n) WHERE n.context = $context RETURN count(n) AS count").await,
            0
        );

        let in_a = queries.full_text(&a, "Foo", 10).await.expect("Search failed");
        assert!(in_a.iter().any(|m| m.name == "Foo" && m.context == "it_iso_a"));
    }

    #[tokio::test]
    async fn test_unscoped_query_is_rejected() {
        let ctx = create_context().await;
        let graph = workspace(&ctx, "it_unscoped").await;

        let result = graph.query("MATCH (n:Class) RETURN n.name AS name").fetch_all().await;

        assert!(matches!(result, Err(AppError::UnscopedQuery(_))));
    }

    #[tokio::test]
    async fn test_class_merge_is_idempotent() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_merge").await;

        memories
            .store(&graph, &[class(&graph, "Foo").with_content("v1")], &[])
            .await
            .expect("First store failed");
        memories
            .store(&graph, &[class(&graph, "Foo").with_content("v2")], &[])
            .await
            .expect("Second store failed");

        let rows = graph
            .query("MATCH (n:Class {name: 'Foo'}) WHERE n.context = $context RETURN n.content AS content")
            .fetch_all()
            .await
            .expect("Query failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("content").unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_methods_are_appended() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_append").await;
        let method = CodeMemory::new(graph.workspace().clone(), EntityKind::Method, "run")
            .at("src/job.rs", 12);

        memories
            .store(&graph, std::slice::from_ref(&method), &[])
            .await
            .expect("First store failed");
        memories
            .store(&graph, std::slice::from_ref(&method), &[])
            .await
            .expect("Second store failed");

        // Re-indexing without deleting first duplicates methods.
        assert_eq!(
            count(
                &graph,
                "MATCH (n:Method {name: 'run'}) WHERE n.context = $context RETURN count(n) AS count"
            )
            .await,
            2
        );

        let deleted = memories
            .delete_by_file_path(&graph, "src/job.rs")
            .await
            .expect("Delete failed");
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn test_missing_target_becomes_reference() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_reference").await;

        let counts = memories
            .store(&graph, &[class(&graph, "Foo")], &[uses("Foo", "NotIndexedYet")])
            .await
            .expect("Store failed");
        assert_eq!(counts.relationships, 1);

        assert_eq!(
            count(
                &graph,
                "MATCH (:Class {name: 'Foo', context: $context})-[:USES]->(r:Reference {name: 'NotIndexedYet'})
                 WHERE r.context = $context
                 RETURN count(r) AS count"
            )
            .await,
            1
        );
    }

    #[tokio::test]
    async fn test_impact_analysis_follows_inbound_edges() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_impact").await;

        memories
            .store(
                &graph,
                &[
                    class(&graph, "ImpactBase"),
                    class(&graph, "ImpactUser"),
                    class(&graph, "ImpactChild"),
                ],
                &[
                    uses("ImpactUser", "ImpactBase"),
                    Relationship::new("ImpactChild", "ImpactUser", RelationshipType::Inherits),
                ],
            )
            .await
            .expect("Store failed");

        let impacted = queries
            .impact_analysis(&graph, "ImpactBase", 5, 100)
            .await
            .expect("Impact failed");
        let names: Vec<_> = impacted.iter().map(|e| (e.name.as_str(), e.distance)).collect();
        assert_eq!(names, vec![("ImpactUser", 1), ("ImpactChild", 2)]);

        let resolved = queries
            .resolve_workspace("ImpactBase")
            .await
            .expect("Lookup failed");
        assert_eq!(resolved.as_ref().map(Workspace::as_str), Some("it_impact"));

        let chain = queries
            .dependency_chain(&graph, "ImpactChild", 5)
            .await
            .expect("Chain failed");
        assert!(chain.is_empty(), "INHERITS is not a USES dependency");
    }

    #[tokio::test]
    async fn test_cycle_within_workspace_is_found() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_cycle").await;

        memories
            .store(
                &graph,
                &[class(&graph, "A"), class(&graph, "B"), class(&graph, "C")],
                &[uses("A", "B"), uses("B", "C"), uses("C", "A")],
            )
            .await
            .expect("Store failed");

        let cycles = queries.find_cycles(&graph, 50).await.expect("Cycles failed");

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members, vec!["A", "B", "C"]);
        assert_eq!(cycles[0].context, "it_cycle");
    }

    #[tokio::test]
    async fn test_cycle_split_across_workspaces_is_not_reported() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let w1 = workspace(&ctx, "it_split_one").await;
        let w2 = workspace(&ctx, "it_split_two").await;

        memories
            .store(
                &w1,
                &[class(&w1, "SplitA"), class(&w1, "SplitB")],
                &[uses("SplitA", "SplitB")],
            )
            .await
            .expect("Store failed");
        memories
            .store(
                &w2,
                &[class(&w2, "SplitB"), class(&w2, "SplitC")],
                &[uses("SplitB", "SplitC"), uses("SplitC", "SplitA")],
            )
            .await
            .expect("Store failed");

        assert!(queries.find_cycles(&w1, 50).await.unwrap().is_empty());
        assert!(queries.find_cycles(&w2, 50).await.unwrap().is_empty());

        let all = queries.find_cycles_all(50).await.expect("Cycles failed");
        assert!(all
            .iter()
            .all(|c| !c.context.starts_with("it_split")));
    }

    #[tokio::test]
    async fn test_cycles_sharing_a_member_are_reported_separately() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_figure_eight").await;

        memories
            .store(
                &graph,
                &[class(&graph, "A"), class(&graph, "B"), class(&graph, "C")],
                &[uses("A", "B"), uses("B", "A"), uses("A", "C"), uses("C", "A")],
            )
            .await
            .expect("Store failed");

        let cycles = queries.find_cycles(&graph, 50).await.expect("Cycles failed");
        let mut members: Vec<_> = cycles.into_iter().map(|c| c.members).collect();
        members.sort();

        assert_eq!(members, vec![vec!["A", "B"], vec!["A", "C"]]);
    }

    #[tokio::test]
    async fn test_full_text_falls_back_without_index() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let queries = QueryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_fallback").await;

        memories
            .store(&graph, &[class(&graph, "Fallback").with_content("struct Fallback")], &[])
            .await
            .expect("Store failed");
        graph
            .unscoped()
            .query(&format!("DROP INDEX {} IF EXISTS", FULLTEXT_INDEX))
            .run()
            .await
            .expect("Failed to drop index");

        let found = queries.full_text(&graph, "fallback", 10).await;
        SchemaRepository::new(graph.unscoped()).ensure().await;

        let found = found.expect("Search failed");
        assert!(found.iter().any(|m| m.name == "Fallback"), "{found:?}");
    }

    #[tokio::test]
    async fn test_routing_is_stable() {
        let ctx = create_context().await;
        let workspace = Workspace::new("it_routing").expect("valid workspace");

        let first = ctx.graphs.workspace(&workspace).await.expect("Route failed");
        let second = ctx.graphs.workspace(&workspace).await.expect("Route failed");

        assert_eq!(first.mode(), second.mode());
        assert_eq!(first.database(), second.database());
        assert_eq!(
            first.mode() == IsolationMode::Database,
            ctx.graphs.supports_databases().await
        );
    }

    #[tokio::test]
    async fn test_workspace_resolves_after_restart() {
        let ctx = create_context().await;
        let memories = MemoryRepository::from_ref(&ctx);
        let graph = workspace(&ctx, "it_restart").await;
        memories
            .store(&graph, &[class(&graph, "RestartTarget")], &[])
            .await
            .expect("Store failed");
        drop(memories);
        drop(ctx);

        let restarted = create_context().await;
        let resolved = QueryRepository::from_ref(&restarted)
            .resolve_workspace("RestartTarget")
            .await
            .expect("Lookup failed");

        assert_eq!(resolved.as_ref().map(Workspace::as_str), Some("it_restart"));
    }
}
