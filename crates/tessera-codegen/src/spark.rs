//! PySpark code generation backend.
//!
//! Each relation becomes one DataFrame assignment (`df0 = ...`). Columns are
//! referenced through the DataFrame they belong to, so joined inputs stay
//! unambiguous.

use std::collections::HashMap;

use tessera_ir::lineage::column_tables;
use tessera_ir::{
    expand_bucket, expand_histogram, BinaryOp, DatePart, Expr, FrameBound, FrameKind, JoinKind,
    NodeRef, Op, ReductionFunc, SetOpKind, ShiftKind, UnaryOp,
};
use tessera_types::{DataType, TypeKind, Value};

use crate::backend::{Artifact, Backend, CompilationError};

/// PySpark code generation backend.
pub struct SparkBackend {
    /// Session variable name.
    session_var: String,
}

impl Default for SparkBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SparkBackend {
    pub fn new() -> Self {
        Self {
            session_var: "spark".to_string(),
        }
    }

    /// Create with custom session variable name.
    pub fn with_session(session_var: &str) -> Self {
        Self {
            session_var: session_var.to_string(),
        }
    }

    fn generate_imports(&self) -> String {
        r#"from pyspark.sql import SparkSession
from pyspark.sql import functions as F
from pyspark.sql.window import Window"#
            .to_string()
    }

    fn generate_session(&self) -> String {
        format!(
            r#"{} = SparkSession.builder \
    .appName("tessera") \
    .getOrCreate()"#,
            self.session_var
        )
    }
}

impl Backend for SparkBackend {
    fn name(&self) -> &str {
        "pyspark"
    }

    fn compile(&self, root: &NodeRef) -> Result<Artifact, CompilationError> {
        let mut compiler = SparkCompiler::new(&self.session_var);
        let result = compiler.result(root)?;
        compiler.lines.push(format!("result = {}", result));
        Ok(Artifact::Python(format!(
            "{}\n\n{}\n\n{}",
            self.generate_imports(),
            self.generate_session(),
            compiler.lines.join("\n")
        )))
    }
}

/// Window used for reductions that apply to a whole table.
const WHOLE_TABLE: &str = "Window.partitionBy()";
/// Order for row-numbering functions that were given none.
const ARRIVAL_ORDER: &str = "Window.orderBy(F.monotonically_increasing_id())";

struct SparkCompiler<'a> {
    session: &'a str,
    lines: Vec<String>,
    frames: HashMap<NodeRef, String>,
}

impl<'a> SparkCompiler<'a> {
    fn new(session: &'a str) -> Self {
        Self {
            session,
            lines: Vec::new(),
            frames: HashMap::new(),
        }
    }

    fn unsupported(&self, construct: impl Into<String>) -> CompilationError {
        CompilationError::unsupported("pyspark", construct)
    }

    /// Expression assigned to `result`.
    fn result(&mut self, root: &NodeRef) -> Result<String, CompilationError> {
        if root.is_relation() {
            return self.frame(root);
        }
        let name = root.name().unwrap_or_else(|_| "result".to_string());
        let scalar = root.output().is_scalar();
        let base = match column_tables(root).into_iter().next() {
            Some(table) => self.frame(&table)?,
            None => format!("{}.range(1)", self.session),
        };
        let value = self.expr(root, scalar)?;
        let method = if scalar { "agg" } else { "select" };
        Ok(format!("{}.{}({}.alias({}))", base, method, value, py_string(&name)))
    }

    /// DataFrame variable holding a relation, emitting its assignment the
    /// first time it is seen.
    fn frame(&mut self, node: &NodeRef) -> Result<String, CompilationError> {
        if let Some(var) = self.frames.get(node) {
            return Ok(var.clone());
        }
        let code = self.generate_df(node)?;
        let var = format!("df{}", self.frames.len());
        self.lines.push(format!("{} = {}", var, code));
        self.frames.insert(node.clone(), var.clone());
        Ok(var)
    }

    fn generate_df(&mut self, node: &NodeRef) -> Result<String, CompilationError> {
        match node.op() {
            Op::UnboundTable { name, .. } | Op::DatabaseTable { name, .. } => {
                Ok(format!("{}.table({})", self.session, py_string(name)))
            }

            Op::Projection { table, selections } => {
                let input = self.frame(table)?;
                let cols = selections
                    .iter()
                    .map(|sel| self.named(sel, false))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{}.select({})", input, cols.join(", ")))
            }

            Op::Filter { table, predicates } => {
                let input = self.frame(table)?;
                let preds = self.exprs(predicates, false)?;
                Ok(format!("{}.filter({})", input, preds.join(" & ")))
            }

            Op::Sort { table, keys } => {
                let input = self.frame(table)?;
                let keys = self.exprs(keys, false)?;
                Ok(format!("{}.orderBy({})", input, keys.join(", ")))
            }

            Op::Limit { table, n, offset } => {
                let input = self.frame(table)?;
                if *offset > 0 {
                    Ok(format!("{}.offset({}).limit({})", input, offset, n))
                } else {
                    Ok(format!("{}.limit({})", input, n))
                }
            }

            Op::Aggregation { table, metrics, by } => {
                let input = self.frame(table)?;
                let mut aggs = Vec::with_capacity(metrics.len());
                for metric in metrics {
                    aggs.push(self.named(metric, true)?);
                }
                if by.is_empty() {
                    return Ok(format!("{}.agg({})", input, aggs.join(", ")));
                }
                let keys = by
                    .iter()
                    .map(|key| self.named(key, false))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "{}.groupBy({}).agg({})",
                    input,
                    keys.join(", "),
                    aggs.join(", ")
                ))
            }

            Op::Join {
                kind,
                left,
                right,
                predicates,
            } => self.join(*kind, left, right, predicates),

            Op::SetOp {
                kind: SetOpKind::Union,
                left,
                right,
                distinct,
            } => {
                let l = self.frame(left)?;
                let r = self.frame(right)?;
                let dedup = if *distinct { ".distinct()" } else { "" };
                Ok(format!("{}.unionByName({}){}", l, r, dedup))
            }
            Op::SetOp { kind, .. } => Err(self.unsupported(format!("{:?} set operation", kind))),

            _ => Err(self.unsupported(format!("{} as a relation", node.kind().name()))),
        }
    }

    fn join(
        &mut self,
        kind: JoinKind,
        left: &NodeRef,
        right: &NodeRef,
        predicates: &[NodeRef],
    ) -> Result<String, CompilationError> {
        let l = self.frame(left)?;
        let r = self.frame(right)?;
        let preds = self.exprs(predicates, false)?;
        let how = match kind {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Outer => "outer",
            JoinKind::Semi => "left_semi",
            JoinKind::Anti => "left_anti",
        };
        let joined = if preds.is_empty() {
            format!("{}.crossJoin({})", l, r)
        } else {
            format!("{}.join({}, {}, {})", l, r, preds.join(" & "), py_string(how))
        };
        if kind.is_filtering() {
            return Ok(joined);
        }
        let left_schema = left.schema().cloned().unwrap_or_default();
        let right_schema = right.schema().cloned().unwrap_or_default();
        let mut cols: Vec<String> = left_schema
            .names()
            .map(|name| format!("{}[{}]", l, py_string(name)))
            .collect();
        for name in right_schema.names() {
            let col = format!("{}[{}]", r, py_string(name));
            if left_schema.contains(name) {
                cols.push(format!("{}.alias({})", col, py_string(&format!("{}_right", name))));
            } else {
                cols.push(col);
            }
        }
        Ok(format!("{}.select({})", joined, cols.join(", ")))
    }

    fn exprs(&mut self, nodes: &[NodeRef], agg: bool) -> Result<Vec<String>, CompilationError> {
        nodes.iter().map(|n| self.expr(n, agg)).collect()
    }

    fn named(&mut self, node: &NodeRef, agg: bool) -> Result<String, CompilationError> {
        let code = self.expr(node, agg)?;
        let name = node.name()?;
        match node.op() {
            Op::TableColumn { name: col, .. } if *col == name => Ok(code),
            _ => Ok(format!("{}.alias({})", code, py_string(&name))),
        }
    }

    fn expr(&mut self, node: &NodeRef, agg: bool) -> Result<String, CompilationError> {
        match node.op() {
            Op::Literal { value, dtype } => self.literal(value, dtype),

            Op::TableColumn { table, name } => {
                let frame = self.frame(table)?;
                Ok(format!("{}[{}]", frame, py_string(name)))
            }

            Op::Alias { arg, .. } => self.expr(arg, agg),

            Op::Binary { op, left, right } => {
                let l = self.expr(left, agg)?;
                let r = self.expr(right, agg)?;
                let symbol = match op {
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::And => "&",
                    BinaryOp::Or => "|",
                    other => other.symbol(),
                };
                Ok(format!("({} {} {})", l, symbol, r))
            }

            Op::Unary { op, arg } => {
                let x = self.expr(arg, agg)?;
                Ok(match op {
                    UnaryOp::Not => format!("(~{})", x),
                    UnaryOp::Negate => format!("(-{})", x),
                    UnaryOp::IsNull => format!("{}.isNull()", x),
                    UnaryOp::NotNull => format!("{}.isNotNull()", x),
                    UnaryOp::Abs => format!("F.abs({})", x),
                    UnaryOp::Floor => format!("F.floor({})", x),
                    UnaryOp::Ceil => format!("F.ceil({})", x),
                })
            }

            Op::Cast { arg, to } => {
                let x = self.expr(arg, agg)?;
                Ok(format!("{}.cast({})", x, py_string(&self.type_name(to)?)))
            }

            Op::IsIn { arg, options } => {
                let x = self.expr(arg, agg)?;
                let opts = self.exprs(options, agg)?;
                Ok(format!("{}.isin([{}])", x, opts.join(", ")))
            }

            Op::Like { arg, pattern } => {
                let x = self.expr(arg, agg)?;
                Ok(format!("{}.like({})", x, py_string(pattern)))
            }

            Op::Extract { part, arg } => {
                let x = self.expr(arg, agg)?;
                let func = match part {
                    DatePart::Year => "F.year",
                    DatePart::Quarter => "F.quarter",
                    DatePart::Month => "F.month",
                    DatePart::Day => "F.dayofmonth",
                    DatePart::DayOfWeek => "F.dayofweek",
                    DatePart::Hour => "F.hour",
                    DatePart::Minute => "F.minute",
                    DatePart::Second => "F.second",
                };
                Ok(format!("{}({})", func, x))
            }

            Op::SearchedCase {
                conditions,
                results,
                default,
            } => {
                let mut code = String::from("F");
                for (cond, result) in conditions.iter().zip(results) {
                    let c = self.expr(cond, agg)?;
                    let r = self.expr(result, agg)?;
                    code.push_str(&format!(".when({}, {})", c, r));
                }
                code.push_str(&format!(".otherwise({})", self.expr(default, agg)?));
                Ok(code)
            }

            Op::Reduction { func, arg, filter } => {
                let call = self.reduction(*func, arg, filter.as_ref())?;
                Ok(if agg {
                    call
                } else {
                    format!("{}.over({})", call, WHOLE_TABLE)
                })
            }

            Op::CountStar { .. } if agg => Ok("F.count(F.lit(1))".to_string()),
            Op::CountStar { .. } => Ok(format!("F.count(F.lit(1)).over({})", WHOLE_TABLE)),

            Op::RowNumber | Op::Rank { .. } | Op::Shift { .. } => {
                self.window(node, &[], &[], None)
            }

            Op::WindowFunction {
                func,
                group_by,
                order_by,
                frame,
                start,
                end,
            } => self.window(func, group_by, order_by, Some((*frame, start, end))),

            Op::SortKey { expr, ascending } => {
                let x = self.expr(expr, agg)?;
                Ok(format!("{}.{}()", x, if *ascending { "asc" } else { "desc" }))
            }

            Op::Bucket { .. } => {
                let expanded = expand_bucket(&Expr::try_from_node(node.clone())?)?;
                self.expr(expanded.node(), agg)
            }

            Op::Histogram { .. } => {
                let expanded = expand_histogram(&Expr::try_from_node(node.clone())?)?;
                self.expr(expanded.node(), agg)
            }

            Op::Udf { func, .. } => {
                Err(self.unsupported(format!("user-defined function {}", func.name())))
            }
            Op::SummaryFilter { .. } => Err(self.unsupported("summary filter")),
            Op::TopK { .. } => Err(self.unsupported("top-k outside a filter")),

            _ => Err(self.unsupported(format!("{} as a value", node.kind().name()))),
        }
    }

    fn reduction(
        &mut self,
        func: ReductionFunc,
        arg: &NodeRef,
        filter: Option<&NodeRef>,
    ) -> Result<String, CompilationError> {
        let name = match func {
            ReductionFunc::Sum => "F.sum",
            ReductionFunc::Mean => "F.avg",
            ReductionFunc::Min => "F.min",
            ReductionFunc::Max => "F.max",
            ReductionFunc::Count => "F.count",
            ReductionFunc::Std => "F.stddev_samp",
            ReductionFunc::Var => "F.var_samp",
        };
        let mut x = self.expr(arg, true)?;
        if let Some(filter) = filter {
            x = format!("F.when({}, {})", self.expr(filter, true)?, x);
        }
        Ok(format!("{}({})", name, x))
    }

    fn window(
        &mut self,
        func: &NodeRef,
        group_by: &[NodeRef],
        order_by: &[NodeRef],
        frame: Option<(FrameKind, &FrameBound, &FrameBound)>,
    ) -> Result<String, CompilationError> {
        let partition = self.exprs(group_by, false)?;
        let mut order = self.exprs(order_by, false)?;

        let (call, framed, zero_based) = match func.op() {
            Op::RowNumber => ("F.row_number()".to_string(), false, true),
            Op::Rank { arg, dense } => {
                order.insert(0, format!("{}.asc()", self.expr(arg, false)?));
                let name = if *dense { "F.dense_rank()" } else { "F.rank()" };
                (name.to_string(), false, true)
            }
            Op::Shift { kind, arg, offset } => {
                let name = match kind {
                    ShiftKind::Lag => "F.lag",
                    ShiftKind::Lead => "F.lead",
                };
                let x = self.expr(arg, false)?;
                (format!("{}({}, {})", name, x, offset), false, false)
            }
            Op::Reduction { func, arg, filter } => {
                (self.reduction(*func, arg, filter.as_ref())?, true, false)
            }
            Op::CountStar { .. } => ("F.count(F.lit(1))".to_string(), true, false),
            Op::Udf { func, .. } => {
                return Err(self.unsupported(format!("user-defined function {}", func.name())))
            }
            _ => return Err(self.unsupported(format!("{} over a window", func.kind().name()))),
        };

        let mut spec = String::from("Window");
        if !partition.is_empty() {
            spec.push_str(&format!(".partitionBy({})", partition.join(", ")));
        }
        if !order.is_empty() {
            spec.push_str(&format!(".orderBy({})", order.join(", ")));
        } else if !framed {
            // ranking and offset functions need an order
            spec = if partition.is_empty() {
                ARRIVAL_ORDER.to_string()
            } else {
                format!("{}.orderBy(F.monotonically_increasing_id())", spec)
            };
        }
        if spec == "Window" {
            spec = WHOLE_TABLE.to_string();
        }
        if let (true, Some((kind, start, end))) = (framed, frame) {
            let method = match kind {
                FrameKind::Rows => "rowsBetween",
                FrameKind::Range => "rangeBetween",
            };
            spec.push_str(&format!(
                ".{}({}, {})",
                method,
                self.bound(start, true)?,
                self.bound(end, false)?
            ));
        }
        let code = format!("{}.over({})", call, spec);
        Ok(if zero_based {
            format!("({} - 1)", code)
        } else {
            code
        })
    }

    fn bound(&self, bound: &FrameBound, is_start: bool) -> Result<String, CompilationError> {
        Ok(match bound {
            FrameBound::Unbounded if is_start => "Window.unboundedPreceding".to_string(),
            FrameBound::Unbounded => "Window.unboundedFollowing".to_string(),
            FrameBound::CurrentRow => "Window.currentRow".to_string(),
            FrameBound::Preceding(v) => format!("-{}", self.offset(v)?),
            FrameBound::Following(v) => self.offset(v)?,
        })
    }

    fn offset(&self, value: &Value) -> Result<String, CompilationError> {
        match value {
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(format!("{:?}", f)),
            Value::Interval { .. } => Err(self.unsupported("interval range frame")),
            other => Err(self.unsupported(format!("frame offset {}", other))),
        }
    }

    fn literal(&self, value: &Value, dtype: &DataType) -> Result<String, CompilationError> {
        Ok(match value {
            Value::Null if dtype.is_null() => "F.lit(None)".to_string(),
            Value::Null => format!("F.lit(None).cast({})", py_string(&self.type_name(dtype)?)),
            Value::Boolean(b) => format!("F.lit({})", if *b { "True" } else { "False" }),
            Value::Int(n) => format!("F.lit({})", n),
            Value::Float(f) if f.is_finite() => format!("F.lit({:?})", f),
            Value::Float(f) => format!("F.lit(float({}))", py_string(&f.to_string())),
            Value::String(s) if dtype.is_temporal() => format!(
                "F.lit({}).cast({})",
                py_string(s),
                py_string(&self.type_name(dtype)?)
            ),
            Value::String(s) => format!("F.lit({})", py_string(s)),
            Value::Date(d) => format!("F.lit({}).cast(\"date\")", py_string(&d.format("%Y-%m-%d").to_string())),
            Value::Timestamp(ts) => format!(
                "F.lit({}).cast(\"timestamp\")",
                py_string(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            ),
            Value::Interval { value, unit } => {
                format!("F.expr({})", py_string(&format!("INTERVAL {} {}", value, unit.sql_name())))
            }
        })
    }

    fn type_name(&self, dtype: &DataType) -> Result<String, CompilationError> {
        Ok(match dtype.kind() {
            TypeKind::Boolean => "boolean".to_string(),
            TypeKind::Int8 => "tinyint".to_string(),
            TypeKind::Int16 | TypeKind::UInt8 => "smallint".to_string(),
            TypeKind::Int32 | TypeKind::UInt16 => "int".to_string(),
            TypeKind::Int64 | TypeKind::UInt32 | TypeKind::Category { .. } => "bigint".to_string(),
            TypeKind::UInt64 => "decimal(20,0)".to_string(),
            TypeKind::Float32 => "float".to_string(),
            TypeKind::Float64 => "double".to_string(),
            TypeKind::Decimal {
                precision: Some(p),
                scale,
            } => format!("decimal({},{})", p, scale.unwrap_or(0)),
            TypeKind::Decimal { .. } => "decimal".to_string(),
            TypeKind::String => "string".to_string(),
            TypeKind::Binary => "binary".to_string(),
            TypeKind::Date => "date".to_string(),
            TypeKind::Timestamp { .. } => "timestamp".to_string(),
            TypeKind::Array(inner) => format!("array<{}>", self.type_name(inner)?),
            TypeKind::Map(k, v) => format!("map<{},{}>", self.type_name(k)?, self.type_name(v)?),
            TypeKind::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, ty)| Ok(format!("{}:{}", name, self.type_name(ty)?)))
                    .collect::<Result<Vec<_>, CompilationError>>()?;
                format!("struct<{}>", fields.join(","))
            }
            TypeKind::Null | TypeKind::Time | TypeKind::Interval { .. } => {
                return Err(self.unsupported(format!("{} values", dtype)))
            }
        })
    }
}

/// Double-quoted Python string literal.
fn py_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
