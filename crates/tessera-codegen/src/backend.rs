//! Backend trait and compilation results.

use std::fmt;

use tessera_ir::{IrError, NodeRef, UdfError};
use tessera_types::{Schema, Value};

/// A compilation backend.
///
/// Backends accept any well-typed root, including graphs built only from
/// unbound tables, and either produce the same artifact every time or name
/// the construct they cannot express.
pub trait Backend: Send + Sync {
    /// Name the backend is registered under.
    fn name(&self) -> &str;

    /// Compile an IR graph.
    fn compile(&self, root: &NodeRef) -> Result<Artifact, CompilationError>;

    /// Run an IR graph and collect its rows.
    fn execute(&self, _root: &NodeRef) -> Result<ResultSet, CompilationError> {
        Err(CompilationError::ExecutionUnsupported(self.name().to_string()))
    }

    /// Schema of a table the backend knows about.
    fn table_schema(&self, table: &str) -> Result<Schema, CompilationError> {
        Err(CompilationError::TableNotFound {
            backend: self.name().to_string(),
            table: table.to_string(),
        })
    }
}

/// Compilation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompilationError {
    #[error("{backend} backend does not support {construct}")]
    Unsupported { backend: String, construct: String },

    #[error("no backend registered as '{0}'")]
    UnknownBackend(String),

    #[error("expression draws from more than one backend: {}", .0.join(", "))]
    MultipleBackends(Vec<String>),

    #[error("{0} backend cannot execute expressions")]
    ExecutionUnsupported(String),

    #[error("{backend} backend has no table '{table}'")]
    TableNotFound { backend: String, table: String },

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("user-defined function failed: {0}")]
    Udf(#[from] UdfError),
}

impl CompilationError {
    pub fn unsupported(backend: &str, construct: impl Into<String>) -> Self {
        CompilationError::Unsupported {
            backend: backend.to_string(),
            construct: construct.into(),
        }
    }
}

/// Output of a backend's compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    Sql(String),
    Python(String),
}

impl Artifact {
    pub fn text(&self) -> &str {
        match self {
            Artifact::Sql(text) | Artifact::Python(text) => text,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Rows returned by [`Backend::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub schema: Schema,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Values of one column, in row order. `None` when the column is
    /// unknown or a row is too short to hold it.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.schema.index_of(name)?;
        self.rows.iter().map(|row| row.get(index).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Backend for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn compile(&self, _root: &NodeRef) -> Result<Artifact, CompilationError> {
            Ok(Artifact::Sql("SELECT 1".to_string()))
        }
    }

    #[test]
    fn test_default_execute_is_unsupported() {
        let t = tessera_ir::Table::unbound("t", &[("a", "int64")]).unwrap();
        let err = Bare.execute(t.node()).unwrap_err();
        assert!(matches!(err, CompilationError::ExecutionUnsupported(ref b) if b == "bare"));
    }

    #[test]
    fn test_default_table_schema_is_not_found() {
        let err = Bare.table_schema("orders").unwrap_err();
        assert_eq!(err.to_string(), "bare backend has no table 'orders'");
    }

    #[test]
    fn test_multiple_backends_message() {
        let err = CompilationError::MultipleBackends(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "expression draws from more than one backend: a, b");
    }

    #[test]
    fn test_result_set_column() {
        let schema = Schema::from_pairs(&[("a", "int64"), ("b", "string")]).unwrap();
        let rs = ResultSet::new(
            schema,
            vec![
                vec![Value::Int(1), Value::from("x")],
                vec![Value::Int(2), Value::from("y")],
            ],
        );
        assert_eq!(rs.column("a"), Some(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(rs.column("c"), None);
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_result_set_column_with_short_row() {
        let schema = Schema::from_pairs(&[("a", "int64"), ("b", "string")]).unwrap();
        let rs = ResultSet::new(
            schema,
            vec![vec![Value::Int(1), Value::from("x")], vec![Value::Int(2)]],
        );
        assert_eq!(rs.column("a"), Some(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(rs.column("b"), None);
    }
}
