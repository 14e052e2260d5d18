//! Vector store access.

mod store;
mod types;

pub use store::VectorStore;
pub use types::VectorPoint;
