//! Query builder for fluent Cypher query construction.

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::graph::row::{Params, Row, RowStream};
use crate::graph::traits::CypherExecutor;

/// Parameter name every workspace-scoped query must reference.
pub const CONTEXT_PARAM: &str = "context";

/// A builder for constructing and executing Cypher queries.
///
/// A query becomes *scoped* through [`Query::scoped`]: the workspace is bound
/// to `$context` at execution time (overriding any caller-supplied value),
/// and the query is refused with [`AppError::UnscopedQuery`] if its text
/// never references `$context`. Scoped queries are the only way services
/// reach workspace data, so a missing tenant filter fails loudly instead of
/// leaking rows across workspaces.
///
/// ```ignore
/// let rows = Query::new(&client, "MATCH (c:Class {name: $name, context: $context}) RETURN c.name AS name")
///     .scoped("demo")
///     .param("name", "Foo")
///     .fetch_all()
///     .await?;
/// ```
pub struct Query<'a, E: CypherExecutor + ?Sized> {
    executor: &'a E,
    cypher: String,
    params: Params,
    scope: Option<String>,
    invalid: Option<String>,
}

impl<'a, E: CypherExecutor + ?Sized> Query<'a, E> {
    pub fn new(executor: &'a E, cypher: &str) -> Self {
        Self {
            executor,
            cypher: cypher.to_string(),
            params: Params::new(),
            scope: None,
            invalid: None,
        }
    }

    /// Binds the query to a workspace. See the type-level docs.
    pub fn scoped(mut self, context: &str) -> Self {
        self.scope = Some(context.to_string());
        self
    }

    /// Adds a parameter, referenced in Cypher as `$name`.
    ///
    /// A value that fails to serialize is reported when the query executes.
    pub fn param<T: Serialize>(mut self, name: &str, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(json_value) => {
                self.params.insert(name.to_string(), json_value);
            }
            Err(e) => {
                self.invalid
                    .get_or_insert_with(|| format!("parameter '{}': {}", name, e));
            }
        }
        self
    }

    /// Adds a parameter that's already a JSON value.
    pub fn param_raw(mut self, name: &str, value: JsonValue) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Validates scoping and parameters, producing the final parameter map.
    fn prepare(self) -> Result<(&'a E, String, Params), AppError> {
        let Query {
            executor,
            cypher,
            mut params,
            scope,
            invalid,
        } = self;

        if let Some(message) = invalid {
            return Err(AppError::Internal(format!("failed to serialize {}", message)));
        }

        if let Some(context) = scope {
            if !references_context(&cypher) {
                return Err(AppError::UnscopedQuery(summarize(&cypher)));
            }
            params.insert(CONTEXT_PARAM.to_string(), JsonValue::String(context));
        }

        Ok((executor, cypher, params))
    }

    /// Executes the query and returns a stream of rows.
    pub async fn execute(self) -> Result<RowStream<'a>, AppError> {
        let (executor, cypher, params) = self.prepare()?;
        executor.execute_cypher(&cypher, params).await
    }

    /// Executes the query and collects all rows.
    pub async fn fetch_all(self) -> Result<Vec<Row>, AppError> {
        self.execute().await?.try_collect().await
    }

    /// Executes the query and returns the first row, if any.
    pub async fn fetch_one(self) -> Result<Option<Row>, AppError> {
        let mut stream = self.execute().await?;
        stream.next().await.transpose()
    }

    /// Executes the query without returning results.
    pub async fn run(self) -> Result<(), AppError> {
        let (executor, cypher, params) = self.prepare()?;
        executor.run_cypher(&cypher, params).await
    }
}

/// True if `$context` appears as a whole parameter reference.
fn references_context(cypher: &str) -> bool {
    cypher.match_indices("$context").any(|(idx, m)| {
        cypher[idx + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// First line of a query, for error messages.
fn summarize(cypher: &str) -> String {
    cypher
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Extension trait providing a convenient `query()` method.
///
/// Implemented for every [`CypherExecutor`], so `executor.query("...")`
/// replaces `Query::new(&executor, "...")`.
pub trait QueryExt: CypherExecutor {
    fn query(&self, cypher: &str) -> Query<'_, Self>
    where
        Self: Sized,
    {
        Query::new(self, cypher)
    }
}

impl<E: CypherExecutor> QueryExt for E {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records the last statement it was asked to run.
    #[derive(Default)]
    struct RecordingExecutor {
        last: Mutex<Option<(String, Params)>>,
    }

    impl RecordingExecutor {
        fn last(&self) -> (String, Params) {
            self.last.lock().unwrap().clone().expect("no query executed")
        }
    }

    #[async_trait::async_trait]
    impl CypherExecutor for RecordingExecutor {
        async fn execute_cypher(
            &self,
            cypher: &str,
            params: Params,
        ) -> Result<RowStream<'_>, AppError> {
            *self.last.lock().unwrap() = Some((cypher.to_string(), params));
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn run_cypher(&self, cypher: &str, params: Params) -> Result<(), AppError> {
            *self.last.lock().unwrap() = Some((cypher.to_string(), params));
            Ok(())
        }
    }

    #[tokio::test]
    async fn params_are_passed_through() {
        let executor = RecordingExecutor::default();

        executor
            .query("MATCH (m:Method) WHERE m.file_path = $path RETURN m.name AS name LIMIT $limit")
            .param("path", "src/lib.rs")
            .param("limit", 5)
            .fetch_all()
            .await
            .unwrap();

        let (_, params) = executor.last();
        let mut expected = HashMap::new();
        expected.insert("path".to_string(), serde_json::json!("src/lib.rs"));
        expected.insert("limit".to_string(), serde_json::json!(5));
        assert_eq!(params, expected);
    }

    #[tokio::test]
    async fn scoped_query_binds_context() {
        let executor = RecordingExecutor::default();

        executor
            .query("MATCH (c:Class {context: $context}) RETURN c.name AS name")
            .scoped("demo")
            .fetch_all()
            .await
            .unwrap();

        let (_, params) = executor.last();
        assert_eq!(params["context"], serde_json::json!("demo"));
    }

    #[tokio::test]
    async fn scope_wins_over_caller_supplied_context() {
        let executor = RecordingExecutor::default();

        executor
            .query("MATCH (c:Class) WHERE c.context = $context DETACH DELETE c")
            .scoped("tenant_a")
            .param("context", "tenant_b")
            .run()
            .await
            .unwrap();

        let (_, params) = executor.last();
        assert_eq!(params["context"], serde_json::json!("tenant_a"));
    }

    #[tokio::test]
    async fn scoped_query_without_filter_is_rejected() {
        let executor = RecordingExecutor::default();

        let result = executor
            .query("MATCH (c:Class)\nRETURN c.name AS name")
            .scoped("demo")
            .fetch_all()
            .await;

        match result {
            Err(AppError::UnscopedQuery(summary)) => assert_eq!(summary, "MATCH (c:Class)"),
            other => panic!("expected UnscopedQuery, got {:?}", other.map(|r| r.len())),
        }
        assert!(executor.last.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn similar_parameter_names_do_not_count_as_scope() {
        let executor = RecordingExecutor::default();

        let result = executor
            .query("MATCH (c:Class {context: $context_name}) RETURN c")
            .scoped("demo")
            .run()
            .await;

        assert!(matches!(result, Err(AppError::UnscopedQuery(_))));
    }

    #[tokio::test]
    async fn unserializable_param_fails_at_execution() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("nope"))
            }
        }

        let executor = RecordingExecutor::default();
        let result = executor
            .query("RETURN $value AS value")
            .param("value", Broken)
            .run()
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
