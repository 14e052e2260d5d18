//! Backend implementations of the graph traits.
//!
//! A backend provides a client and a transaction type implementing
//! [`CypherExecutor`](crate::graph::CypherExecutor),
//! [`GraphClient`](crate::graph::GraphClient) and
//! [`Transaction`](crate::graph::Transaction).
//!
//! | Backend | Module |
//! |---------|--------|
//! | Neo4j (Bolt) | [`neo4j`] |

pub mod neo4j;
