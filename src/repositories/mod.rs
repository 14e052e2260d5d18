//! Data access layer for graph operations.
//!
//! Repositories provide a clean abstraction over graph queries,
//! using the `FromContext` derive macro for dependency injection.

mod memory;
mod query;
mod schema;

pub use memory::{MemoryRepository, WriteCounts};
pub use query::{escape_lucene, QueryRepository};
pub use schema::{SchemaReport, SchemaRepository, FULLTEXT_INDEX};
