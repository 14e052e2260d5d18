//! Dependency injection infrastructure.
//!
//! - `FromRef<T>`: extract a value from `&T`
//! - `#[derive(Context)]`: makes each field of the root extractable
//! - `#[derive(FromContext)]`: builds a type by resolving each field
//!
//! ```ignore
//! #[derive(FromContext, Clone)]
//! pub struct AnalysisService {
//!     queries: QueryRepository, // itself FromContext
//!     config: Arc<Config>,      // a Context field
//! }
//!
//! let service = AnalysisService::from_ref(&ctx);
//! ```

/// Extracts a value from a reference to another type.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

/// Any `Clone` type can be extracted from itself.
impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

pub use di_macros::{Context, FromContext};
