//! Routing expressions to backends.
//!
//! An expression is compiled by the backend its database tables come from.
//! Expressions built only from unbound tables go to the configured default
//! backend, or to one named explicitly with [`compile_with`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tessera_ir::{options, Expr, Node, NodeRef, Op, Table};
use tracing::debug;

use crate::backend::{Artifact, Backend, CompilationError, ResultSet};
use crate::registry::backend;

/// Anything with an IR root.
pub trait Compile {
    fn root(&self) -> &NodeRef;
}

impl Compile for Table {
    fn root(&self) -> &NodeRef {
        self.node()
    }
}

impl Compile for Expr {
    fn root(&self) -> &NodeRef {
        self.node()
    }
}

impl Compile for NodeRef {
    fn root(&self) -> &NodeRef {
        self
    }
}

/// A handle on a registered backend.
#[derive(Clone)]
pub struct Connection {
    backend: Arc<dyn Backend>,
}

/// Connect to the backend registered as `name`.
pub fn connect(name: &str) -> Result<Connection, CompilationError> {
    Ok(Connection {
        backend: backend(name)?,
    })
}

impl Connection {
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// A table of this backend, typed with the schema the backend reports.
    pub fn table(&self, name: &str) -> Result<Table, CompilationError> {
        let schema = self.backend.table_schema(name)?;
        let node = Node::new(Op::DatabaseTable {
            name: name.to_string(),
            schema,
            source: self.name().to_string(),
        })?;
        Ok(Table::try_from_node(node)?)
    }

    pub fn compile(&self, expr: &impl Compile) -> Result<Artifact, CompilationError> {
        self.backend.compile(expr.root())
    }

    pub fn execute(&self, expr: &impl Compile) -> Result<ResultSet, CompilationError> {
        self.backend.execute(expr.root())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("backend", &self.name()).finish()
    }
}

/// Backends referenced by the database tables under `root`, sorted.
pub fn sources(root: &NodeRef) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut visited: HashSet<*const Node> = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !visited.insert(Arc::as_ptr(&node)) {
            continue;
        }
        if let Op::DatabaseTable { source, .. } = node.op() {
            found.insert(source.clone());
        }
        stack.extend(node.children());
    }
    found
}

/// The backend that owns `root`.
pub fn backend_for(root: &NodeRef) -> Result<Arc<dyn Backend>, CompilationError> {
    let found = sources(root);
    let mut names = found.iter();
    match (names.next(), names.next()) {
        (None, _) => {
            let name = options().default_backend;
            debug!(backend = %name, "no database tables, using default backend");
            backend(&name)
        }
        (Some(name), None) => backend(name),
        _ => Err(CompilationError::MultipleBackends(found.into_iter().collect())),
    }
}

/// Compile with the backend the expression belongs to.
pub fn compile(expr: &impl Compile) -> Result<Artifact, CompilationError> {
    let backend = backend_for(expr.root())?;
    debug!(backend = backend.name(), root = %expr.root().kind().name(), "compiling");
    backend.compile(expr.root())
}

/// Execute with the backend the expression belongs to.
pub fn execute(expr: &impl Compile) -> Result<ResultSet, CompilationError> {
    let backend = backend_for(expr.root())?;
    debug!(backend = backend.name(), root = %expr.root().kind().name(), "executing");
    backend.execute(expr.root())
}

/// Compile with a named backend.
pub fn compile_with(name: &str, expr: &impl Compile) -> Result<Artifact, CompilationError> {
    debug!(backend = name, root = %expr.root().kind().name(), "compiling with explicit backend");
    backend(name)?.compile(expr.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::register_backend;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_ir::{Udf, UdfKind};
    use tessera_types::{DataType, Schema, Value};

    /// In-memory backend that can run table scans and UDF reductions.
    struct MockBackend {
        name: String,
        tables: HashMap<String, (Schema, Vec<Vec<Value>>)>,
    }

    impl MockBackend {
        fn new(name: &str) -> Self {
            let schema = Schema::from_pairs(&[("x", "int64"), ("g", "string")]).unwrap();
            let rows = (1..=4)
                .map(|i| vec![Value::Int(i), Value::from(if i % 2 == 0 { "even" } else { "odd" })])
                .collect();
            let mut tables = HashMap::new();
            tables.insert("nums".to_string(), (schema, rows));
            Self {
                name: name.to_string(),
                tables,
            }
        }

        fn scan(&self, table: &NodeRef) -> Result<&(Schema, Vec<Vec<Value>>), CompilationError> {
            match table.op() {
                Op::DatabaseTable { name, .. } => self.tables.get(name).ok_or_else(|| {
                    CompilationError::TableNotFound {
                        backend: self.name.clone(),
                        table: name.clone(),
                    }
                }),
                _ => Err(CompilationError::unsupported(&self.name, table.kind().name())),
            }
        }

        fn column(&self, arg: &NodeRef) -> Result<Vec<Value>, CompilationError> {
            let Op::TableColumn { table, name } = arg.op() else {
                return Err(CompilationError::unsupported(&self.name, arg.kind().name()));
            };
            let (schema, rows) = self.scan(table)?;
            let index = schema
                .index_of(name)
                .ok_or_else(|| CompilationError::unsupported(&self.name, name.clone()))?;
            Ok(rows.iter().map(|row| row[index].clone()).collect())
        }

        fn metric(&self, node: &NodeRef) -> Result<Value, CompilationError> {
            match node.op() {
                Op::Alias { arg, .. } => self.metric(arg),
                Op::Udf { func, args } if func.kind() == UdfKind::Reduction => {
                    let columns = args
                        .iter()
                        .map(|a| self.column(a))
                        .collect::<Result<Vec<_>, _>>()?;
                    let out = func.invoke(&columns)?;
                    Ok(out.into_iter().next().unwrap_or(Value::Null))
                }
                _ => Err(CompilationError::unsupported(&self.name, node.kind().name())),
            }
        }
    }

    impl Backend for MockBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn compile(&self, root: &NodeRef) -> Result<Artifact, CompilationError> {
            Ok(Artifact::Sql(root.to_string()))
        }

        fn execute(&self, root: &NodeRef) -> Result<ResultSet, CompilationError> {
            match root.op() {
                Op::DatabaseTable { .. } => {
                    let (schema, rows) = self.scan(root)?;
                    Ok(ResultSet::new(schema.clone(), rows.clone()))
                }
                Op::Aggregation { metrics, by, .. } if by.is_empty() => {
                    let row = metrics
                        .iter()
                        .map(|m| self.metric(m))
                        .collect::<Result<Vec<_>, _>>()?;
                    let schema = root.schema().cloned().unwrap_or_default();
                    Ok(ResultSet::new(schema, vec![row]))
                }
                _ => Err(CompilationError::unsupported(&self.name, root.kind().name())),
            }
        }

        fn table_schema(&self, table: &str) -> Result<Schema, CompilationError> {
            self.tables
                .get(table)
                .map(|(schema, _)| schema.clone())
                .ok_or_else(|| CompilationError::TableNotFound {
                    backend: self.name.clone(),
                    table: table.to_string(),
                })
        }
    }

    fn mock(name: &str) -> Connection {
        register_backend(Arc::new(MockBackend::new(name)));
        connect(name).unwrap()
    }

    #[test]
    fn test_connection_table_is_rooted_in_backend() {
        let con = mock("mock_rooted");
        let t = con.table("nums").unwrap();
        assert_eq!(t.columns(), vec!["x", "g"]);
        assert_eq!(backend_for(t.node()).unwrap().name(), "mock_rooted");
        assert!(matches!(
            con.table("missing"),
            Err(CompilationError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_udf_body_runs_only_on_execute() {
        let con = mock("mock_udf");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let total = Udf::reduction(
            "total",
            vec![DataType::int64()],
            DataType::int64(),
            move |cols: &[Vec<Value>]| {
                seen.fetch_add(1, Ordering::SeqCst);
                let sum = cols[0].iter().filter_map(Value::as_i64).sum::<i64>();
                Ok(vec![Value::Int(sum)])
            },
        );
        let t = con.table("nums").unwrap();
        let expr = t
            .aggregate([total.call([t.col("x").unwrap()]).unwrap().alias("total").unwrap()])
            .unwrap();
        compile(&expr).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = execute(&expr).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.column("total"), Some(vec![Value::Int(10)]));
    }

    #[test]
    fn test_execute_scan() {
        let con = mock("mock_scan");
        let t = con.table("nums").unwrap();
        let result = con.execute(&t).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.column("g").unwrap()[1], Value::from("even"));
    }

    #[test]
    fn test_multiple_backends_rejected() {
        let a = mock("mock_left").table("nums").unwrap();
        let b = mock("mock_right").table("nums").unwrap();
        let joined = a
            .join(&b, [a.col("x").unwrap().eq(b.col("x").unwrap()).unwrap()])
            .unwrap();
        match compile(&joined) {
            Err(CompilationError::MultipleBackends(names)) => {
                assert_eq!(names, vec!["mock_left", "mock_right"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unbound_uses_default_backend() {
        let t = Table::unbound("t", &[("a", "int64")]).unwrap();
        assert!(sources(t.node()).is_empty());
        let artifact = compile(&t).unwrap();
        assert!(matches!(artifact, Artifact::Sql(_)));
        let script = compile_with("pyspark", &t).unwrap();
        assert!(matches!(script, Artifact::Python(_)));
    }

    #[test]
    fn test_builtin_backends_do_not_execute() {
        let t = Table::unbound("t", &[("a", "int64")]).unwrap();
        assert!(matches!(
            execute(&t),
            Err(CompilationError::ExecutionUnsupported(_))
        ));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let t = Table::unbound("t", &[("g", "string"), ("v", "float64")]).unwrap();
        let positive = t.filter([t.col("v").unwrap().gt(0).unwrap()]).unwrap();
        let expr = positive
            .group_by(["g"])
            .unwrap()
            .aggregate([positive.col("v").unwrap().sum().unwrap()])
            .unwrap();
        for name in ["duckdb", "pyspark"] {
            let first = compile_with(name, &expr).unwrap();
            let again = compile_with(name, &expr).unwrap();
            assert_eq!(first, again);
        }
    }
}
