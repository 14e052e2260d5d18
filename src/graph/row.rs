//! Row and streaming types for query results.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppError;

/// Query parameters, bound by name (`$name` in Cypher).
pub type Params = HashMap<String, JsonValue>;

/// Rows are fetched on demand as the stream is polled.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<Row, AppError>> + Send + 'a>>;

/// A single result row: column name to JSON value.
///
/// Queries return scalar projections (`RETURN n.name AS name`) rather than
/// whole nodes, so every column is plain JSON.
#[derive(Debug, Clone, Default)]
pub struct Row {
    data: HashMap<String, JsonValue>,
}

impl Row {
    pub fn new(data: HashMap<String, JsonValue>) -> Self {
        Self { data }
    }

    /// Deserializes a column. Missing columns are an error.
    ///
    /// ```ignore
    /// let name: String = row.get("name")?;
    /// let depth: i64 = row.get("depth")?;
    /// ```
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, AppError> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| AppError::Internal(format!("column not found: {}", key)))?;
        decode(key, value)
    }

    /// Like [`Row::get`], but missing and null columns yield `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.data.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => decode(key, value).map(Some),
        }
    }

    /// Reads a column, falling back to `T::default()` when it is absent, null
    /// or of the wrong shape. Used for optional node properties written by
    /// older indexers.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.get_opt(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                tracing::debug!(column = key, error = %err, "Using default for undecodable column");
                T::default()
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &JsonValue) -> Result<T, AppError> {
    T::deserialize(value)
        .map_err(|e| AppError::Internal(format!("failed to deserialize '{}': {}", key, e)))
}

impl From<HashMap<String, JsonValue>> for Row {
    fn from(data: HashMap<String, JsonValue>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    #[test]
    fn typed_columns() {
        let row = row(&[("name", json!("Foo")), ("depth", json!(2))]);

        assert_eq!(row.get::<String>("name").unwrap(), "Foo");
        assert_eq!(row.get::<i64>("depth").unwrap(), 2);
    }

    #[test]
    fn missing_column_is_an_error() {
        let result: Result<String, _> = Row::default().get("name");
        assert!(result.is_err());
    }

    #[test]
    fn optional_columns() {
        let row = row(&[("summary", JsonValue::Null), ("name", json!("Foo"))]);

        assert_eq!(row.get_opt::<String>("summary").unwrap(), None);
        assert_eq!(row.get_opt::<String>("missing").unwrap(), None);
        assert_eq!(row.get_opt::<String>("name").unwrap().as_deref(), Some("Foo"));
    }

    #[test]
    fn list_columns() {
        let row = row(&[("cycle", json!(["A", "B", "C"]))]);

        let cycle: Vec<String> = row.get("cycle").unwrap();
        assert_eq!(cycle, vec!["A", "B", "C"]);
    }

    #[test]
    fn wrong_shape_falls_back_to_default() {
        let row = row(&[("line_number", json!("not a number"))]);

        assert_eq!(row.get_or_default::<i64>("line_number"), 0);
        assert_eq!(row.get_or_default::<String>("absent"), "");
    }
}
