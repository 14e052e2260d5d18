//! Directed edges between code entities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::Metadata;

/// The closed set of relationship types.
///
/// Serialized in `SCREAMING_SNAKE_CASE`, which is also the Cypher
/// relationship type. Because the set is closed, the type can be formatted
/// into Cypher text without injection risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Inherits,
    Implements,
    Uses,
    Calls,
    Defines,
    Imports,
    FollowsPattern,
    ContainsPattern,
    HasTask,
    DependsOn,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 10] = [
        RelationshipType::Inherits,
        RelationshipType::Implements,
        RelationshipType::Uses,
        RelationshipType::Calls,
        RelationshipType::Defines,
        RelationshipType::Imports,
        RelationshipType::FollowsPattern,
        RelationshipType::ContainsPattern,
        RelationshipType::HasTask,
        RelationshipType::DependsOn,
    ];

    pub fn as_cypher(&self) -> &'static str {
        match self {
            RelationshipType::Inherits => "INHERITS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Uses => "USES",
            RelationshipType::Calls => "CALLS",
            RelationshipType::Defines => "DEFINES",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::FollowsPattern => "FOLLOWS_PATTERN",
            RelationshipType::ContainsPattern => "CONTAINS_PATTERN",
            RelationshipType::HasTask => "HAS_TASK",
            RelationshipType::DependsOn => "DEPENDS_ON",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cypher())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_cypher() == upper)
            .ok_or_else(|| {
                let valid: Vec<_> = Self::ALL.iter().map(|t| t.as_cypher()).collect();
                format!(
                    "Invalid relationship type '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// A directed edge `(from) -[type]-> (to)` inside one workspace.
///
/// Endpoints are resolved by name when the edge is written; a missing
/// target becomes a `Reference` placeholder node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    #[serde(default)]
    pub properties: Metadata,
}

impl Relationship {
    pub fn new(from: impl Into<String>, to: impl Into<String>, rel_type: RelationshipType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            rel_type,
            properties: Metadata::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(
            "follows_pattern".parse::<RelationshipType>().unwrap(),
            RelationshipType::FollowsPattern
        );
        assert_eq!("USES".parse::<RelationshipType>().unwrap(), RelationshipType::Uses);
        assert!("OWNS".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn serde_matches_cypher_names() {
        for rel in RelationshipType::ALL {
            let json = serde_json::to_value(rel).unwrap();
            assert_eq!(json, serde_json::json!(rel.as_cypher()));
        }
    }

    #[test]
    fn deserializes_edge_with_default_properties() {
        let edge: Relationship = serde_json::from_value(serde_json::json!({
            "from": "OrderService",
            "to": "Repository",
            "type": "USES",
        }))
        .unwrap();

        assert_eq!(edge.rel_type, RelationshipType::Uses);
        assert!(edge.properties.is_empty());
    }
}
