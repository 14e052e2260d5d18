//! Workspace identity and the storage names derived from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Prefix of every dedicated workspace database.
pub const DATABASE_PREFIX: &str = "cv-";

/// A validated, normalized workspace identifier.
///
/// Workspaces are case-insensitive: the stored form is lowercase and limited
/// to `[a-z0-9_-]`, so it is safe to embed in collection and database names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Workspace(String);

impl Workspace {
    pub fn new(context: &str) -> Result<Self, AppError> {
        let normalized = context.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::InvalidWorkspace("context must not be empty".into()));
        }
        if normalized.len() > 48 {
            return Err(AppError::InvalidWorkspace(format!(
                "'{}' exceeds 48 characters",
                context
            )));
        }
        if let Some(c) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(AppError::InvalidWorkspace(format!(
                "'{}' contains '{}'; use letters, digits, '_' or '-'",
                context, c
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Vector collection for one entity kind, e.g. `demo_classes`.
    pub fn collection(&self, kind: CollectionKind) -> String {
        format!("{}_{}", self.0, kind.suffix())
    }

    /// All vector collections owned by this workspace.
    pub fn collections(&self) -> Vec<String> {
        CollectionKind::ALL
            .iter()
            .map(|kind| self.collection(*kind))
            .collect()
    }

    /// Name of the dedicated graph database, e.g. `cv-demo-2f1c07a9`.
    ///
    /// Neo4j database names allow letters, digits, dots and dashes, so `_`
    /// becomes `-`. The hash of the exact context keeps `my_app` and `my-app`
    /// in separate databases.
    pub fn database_name(&self) -> String {
        let hash = Uuid::new_v5(&Uuid::NAMESPACE_OID, self.0.as_bytes())
            .simple()
            .to_string();
        format!(
            "{}{}-{}",
            DATABASE_PREFIX,
            self.0.replace('_', "-"),
            &hash[..8]
        )
    }

    /// Rejects storage names that are not prefixed by this workspace.
    pub fn ensure_owns(&self, name: &str) -> Result<(), AppError> {
        let owned = name
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('_') || rest.starts_with('-'));
        let dedicated_db = name == self.database_name();

        if owned || dedicated_db {
            Ok(())
        } else {
            Err(AppError::InvalidCollection {
                collection: name.to_string(),
                workspace: self.0.clone(),
            })
        }
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Workspace {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Workspace {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Workspace::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// The per-kind vector collections of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Files,
    Classes,
    Methods,
    Patterns,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Files,
        CollectionKind::Classes,
        CollectionKind::Methods,
        CollectionKind::Patterns,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            CollectionKind::Files => "files",
            CollectionKind::Classes => "classes",
            CollectionKind::Methods => "methods",
            CollectionKind::Patterns => "patterns",
        }
    }
}

/// How a workspace's graph data is isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// A dedicated database per workspace.
    Database,
    /// One shared database, every node and query filtered by `context`.
    SharedFiltered,
}
