//! Domain models for the code memory.

mod analysis;
mod entity;
mod relationship;
mod value;
mod workspace;

pub use analysis::{DependencyCycle, DependencyLink, ImpactedEntity, SearchHit, TextMatch};
pub use entity::{pattern_id, CodeMemory, EntityKind, PatternDetails, CORE_KEYS};
pub use relationship::{Relationship, RelationshipType};
pub use value::{metadata_from_json, MetaValue, Metadata};
pub use workspace::{CollectionKind, IsolationMode, Workspace, DATABASE_PREFIX};
