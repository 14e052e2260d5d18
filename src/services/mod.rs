//! Business logic services for code memory.
//!
//! Services orchestrate repositories and store clients and handle business
//! rules, using the `FromContext` derive macro for dependency injection.

mod analysis;
mod indexing;
mod search;
mod workspace;

pub use analysis::{AnalysisService, CycleReport, DependencyChain, ImpactReport};
pub use indexing::{
    DeleteReport, GraphDelete, GraphWrite, IndexBatch, IndexReport, IndexingService, VectorDelete,
    VectorWrite,
};
pub use search::{SearchService, SemanticQuery, SemanticResults, TextResults};
pub use workspace::{HealthReport, Registration, StoreHealth, WorkspaceService, WorkspaceStatus};
