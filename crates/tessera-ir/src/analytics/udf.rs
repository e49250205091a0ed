//! User-defined functions.
//!
//! A UDF carries its declared signature and an opaque body. Building a call
//! only checks the signature; the body runs when a backend executes the
//! expression, never while the graph is built or compared.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tessera_types::{DataType, Value};

use crate::error::{IrError, UdfError};
use crate::expr::{Expr, IntoExpr};
use crate::ir::Op;
use crate::node::Node;

/// Body of a UDF: one input vector per argument, one output vector back.
pub type UdfBody = dyn Fn(&[Vec<Value>]) -> Result<Vec<Value>, UdfError> + Send + Sync;

/// Shape of the values a UDF produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UdfKind {
    /// One value per row.
    Elementwise,
    /// One value per group.
    Reduction,
    /// One value per row, computed over a window.
    Analytic,
}

/// A declared UDF. Two functions are the same only if they share a body.
#[derive(Clone)]
pub struct UdfFunction {
    name: String,
    kind: UdfKind,
    input_types: Vec<DataType>,
    output_type: DataType,
    body: Arc<UdfBody>,
}

impl UdfFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UdfKind {
        self.kind
    }

    pub fn input_types(&self) -> &[DataType] {
        &self.input_types
    }

    pub fn output_type(&self) -> &DataType {
        &self.output_type
    }

    /// Run the body. Only executing backends call this.
    pub fn invoke(&self, columns: &[Vec<Value>]) -> Result<Vec<Value>, UdfError> {
        if columns.len() != self.input_types.len() {
            return Err(UdfError(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.input_types.len(),
                columns.len()
            )));
        }
        (self.body)(columns)
    }

    fn body_addr(&self) -> usize {
        Arc::as_ptr(&self.body) as *const () as usize
    }
}

impl PartialEq for UdfFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
            && self.name == other.name
            && self.kind == other.kind
            && self.input_types == other.input_types
            && self.output_type == other.output_type
    }
}

impl Eq for UdfFunction {}

impl Hash for UdfFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.kind.hash(state);
        self.input_types.hash(state);
        self.output_type.hash(state);
        self.body_addr().hash(state);
    }
}

impl fmt::Debug for UdfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdfFunction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("input_types", &self.input_types)
            .field("output_type", &self.output_type)
            .field("body", &format_args!("{:#x}", self.body_addr()))
            .finish()
    }
}

/// Constructor for calls to a declared UDF.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Udf {
    func: UdfFunction,
}

impl Udf {
    fn declare<F>(
        kind: UdfKind,
        name: impl Into<String>,
        input_types: Vec<DataType>,
        output_type: DataType,
        body: F,
    ) -> Self
    where
        F: Fn(&[Vec<Value>]) -> Result<Vec<Value>, UdfError> + Send + Sync + 'static,
    {
        Self {
            func: UdfFunction {
                name: name.into(),
                kind,
                input_types,
                output_type,
                body: Arc::new(body),
            },
        }
    }

    /// Declare a function reducing each group to one value.
    pub fn reduction<F>(
        name: impl Into<String>,
        input_types: Vec<DataType>,
        output_type: DataType,
        body: F,
    ) -> Self
    where
        F: Fn(&[Vec<Value>]) -> Result<Vec<Value>, UdfError> + Send + Sync + 'static,
    {
        Self::declare(UdfKind::Reduction, name, input_types, output_type, body)
    }

    /// Declare a function producing one value per row of a window.
    pub fn analytic<F>(
        name: impl Into<String>,
        input_types: Vec<DataType>,
        output_type: DataType,
        body: F,
    ) -> Self
    where
        F: Fn(&[Vec<Value>]) -> Result<Vec<Value>, UdfError> + Send + Sync + 'static,
    {
        Self::declare(UdfKind::Analytic, name, input_types, output_type, body)
    }

    pub fn elementwise<F>(
        name: impl Into<String>,
        input_types: Vec<DataType>,
        output_type: DataType,
        body: F,
    ) -> Self
    where
        F: Fn(&[Vec<Value>]) -> Result<Vec<Value>, UdfError> + Send + Sync + 'static,
    {
        Self::declare(UdfKind::Elementwise, name, input_types, output_type, body)
    }

    pub fn function(&self) -> &UdfFunction {
        &self.func
    }

    /// Build a call node. The body is not run.
    pub fn call<I, E>(&self, args: I) -> Result<Expr, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        let args = args
            .into_iter()
            .map(|a| a.into_expr().map(Expr::into_node))
            .collect::<Result<Vec<_>, _>>()?;
        Node::new(Op::Udf {
            func: self.func.clone(),
            args,
        })
        .map(Expr::from_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Table;
    use crate::node::Output;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> Table {
        Table::unbound("t", &[("a", "float64"), ("b", "int32"), ("s", "string")]).unwrap()
    }

    fn mean_of(columns: &[Vec<Value>]) -> Result<Vec<Value>, UdfError> {
        let values: Vec<f64> = columns[0].iter().filter_map(Value::as_f64).collect();
        if values.is_empty() {
            return Ok(vec![Value::Null]);
        }
        Ok(vec![Value::Float(values.iter().sum::<f64>() / values.len() as f64)])
    }

    #[test]
    fn test_body_is_not_run_during_construction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let udf = Udf::reduction(
            "my_mean",
            vec![DataType::float64()],
            DataType::float64(),
            move |cols| {
                counter.fetch_add(1, Ordering::SeqCst);
                mean_of(cols)
            },
        );
        let t = table();
        let call = udf.call([t.col("a").unwrap()]).unwrap();
        let agg = t.aggregate([call.clone()]).unwrap();
        assert_eq!(agg, agg.clone());
        let _ = format!("{}", agg);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let out = udf
            .function()
            .invoke(&[vec![Value::Float(1.0), Value::Float(3.0)]])
            .unwrap();
        assert_eq!(out, vec![Value::Float(2.0)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_call_shape_follows_kind() {
        let t = table();
        let reduce = Udf::reduction("r", vec![DataType::float64()], DataType::float64(), mean_of);
        let analytic = Udf::analytic("w", vec![DataType::float64()], DataType::float64(), mean_of);
        let a = t.col("a").unwrap();
        assert!(matches!(
            reduce.call([a.clone()]).unwrap().node().output(),
            Output::Scalar(_)
        ));
        assert!(matches!(
            analytic.call([a]).unwrap().node().output(),
            Output::Column(_)
        ));
    }

    #[test]
    fn test_call_checks_signature() {
        let t = table();
        let udf = Udf::elementwise(
            "f",
            vec![DataType::float64(), DataType::int64()],
            DataType::float64(),
            mean_of,
        );
        // int32 widens to both declared inputs
        assert!(udf.call([t.col("a").unwrap(), t.col("b").unwrap()]).is_ok());
        assert!(matches!(
            udf.call([t.col("a").unwrap()]),
            Err(IrError::TypeMismatch { .. })
        ));
        let err = udf
            .call([t.col("a").unwrap(), t.col("s").unwrap()])
            .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { ref arg, .. } if arg == "args[1]"));
    }

    #[test]
    fn test_distinct_bodies_are_unequal() {
        let t = table();
        let one = Udf::elementwise("f", vec![DataType::float64()], DataType::float64(), mean_of);
        let two = Udf::elementwise("f", vec![DataType::float64()], DataType::float64(), mean_of);
        let a = t.col("a").unwrap();
        let x = one.call([a.clone()]).unwrap();
        assert_eq!(x, one.call([a.clone()]).unwrap());
        assert_ne!(x, two.call([a]).unwrap());
    }

    #[test]
    fn test_invoke_checks_arity() {
        let udf = Udf::reduction("r", vec![DataType::float64()], DataType::float64(), mean_of);
        assert!(udf.function().invoke(&[]).is_err());
    }
}
