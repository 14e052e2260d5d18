//! Shorthand for building parameterized Cypher queries.

/// Builds a [`Query`](crate::graph::Query) on any receiver with a `query`
/// method, binding each `name = value` pair as `$name`.
///
/// The receiver decides scoping: on a
/// [`WorkspaceGraph`](crate::graph::WorkspaceGraph) the resulting query is
/// already bound to the workspace.
///
/// ```ignore
/// let rows = cypher!(
///     ws,
///     "MATCH (c:Class {name: $name, context: $context}) RETURN c.file_path AS file_path",
///     name = class_name,
/// )
/// .fetch_all()
/// .await?;
/// ```
#[macro_export]
macro_rules! cypher {
    ($graph:expr, $query:expr) => {
        $graph.query($query)
    };
    ($graph:expr, $query:expr, $($name:ident = $value:expr),+ $(,)?) => {
        $graph.query($query)$(.param(stringify!($name), $value))+
    };
}
