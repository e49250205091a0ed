//! DuckDB SQL backend.
//!
//! Every derived relation becomes a common table expression named `t0`,
//! `t1`, ... in the order it is first reached, so a relation shared by
//! several parents is emitted once. Source tables are referenced by their
//! quoted name.

use std::collections::HashMap;

use dashmap::DashMap;
use tessera_ir::{
    expand_bucket, expand_histogram, options, DatePart, Expr, FrameBound, FrameKind,
    JoinKind, NodeRef, Op, ReductionFunc, SetOpKind, ShiftKind, TopK, UdfKind, UnaryOp,
};
use tessera_ir::lineage::column_tables;
use tessera_types::{DataType, Schema, TypeKind, Value};

use crate::backend::{Artifact, Backend, CompilationError};

/// DuckDB SQL backend.
pub struct SqlBackend {
    name: String,
    tables: DashMap<String, Schema>,
}

impl Default for SqlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlBackend {
    /// The backend registered as `duckdb`.
    pub fn new() -> Self {
        Self::named("duckdb")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: DashMap::new(),
        }
    }

    pub fn with_table(self, name: &str, schema: Schema) -> Self {
        self.register_table(name, schema);
        self
    }

    /// Declare a table so connections can build expressions over it.
    pub fn register_table(&self, name: &str, schema: Schema) {
        self.tables.insert(name.to_string(), schema);
    }
}

impl Backend for SqlBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(&self, root: &NodeRef) -> Result<Artifact, CompilationError> {
        to_sql(&self.name, root, options().sql.pretty).map(Artifact::Sql)
    }

    fn table_schema(&self, table: &str) -> Result<Schema, CompilationError> {
        self.tables
            .get(table)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CompilationError::TableNotFound {
                backend: self.name.clone(),
                table: table.to_string(),
            })
    }
}

/// Render an IR graph as one SQL statement.
pub fn to_sql(backend: &str, root: &NodeRef, pretty: bool) -> Result<String, CompilationError> {
    let mut compiler = SqlCompiler::new(backend, pretty);
    let body = compiler.statement(root)?;
    Ok(compiler.finish(body))
}

struct SqlCompiler<'a> {
    backend: &'a str,
    pretty: bool,
    ctes: Vec<(String, String)>,
    /// Relation -> the name it is referenced by.
    refs: HashMap<NodeRef, String>,
    /// Relations visible to column references, innermost query last.
    scopes: Vec<Vec<(NodeRef, String)>>,
}

impl<'a> SqlCompiler<'a> {
    fn new(backend: &'a str, pretty: bool) -> Self {
        Self {
            backend,
            pretty,
            ctes: Vec::new(),
            refs: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    fn sep(&self) -> &'static str {
        if self.pretty {
            "\n"
        } else {
            " "
        }
    }

    fn unsupported(&self, construct: impl Into<String>) -> CompilationError {
        CompilationError::unsupported(self.backend, construct)
    }

    fn finish(self, body: String) -> String {
        if self.ctes.is_empty() {
            return body;
        }
        let ctes: Vec<String> = self
            .ctes
            .iter()
            .map(|(name, query)| {
                if self.pretty {
                    let indented: Vec<String> =
                        query.lines().map(|line| format!("  {}", line)).collect();
                    format!("{} AS (\n{}\n)", name, indented.join("\n"))
                } else {
                    format!("{} AS ({})", name, query)
                }
            })
            .collect();
        if self.pretty {
            format!("WITH {}\n{}", ctes.join(",\n"), body)
        } else {
            format!("WITH {} {}", ctes.join(", "), body)
        }
    }

    /// The top-level query for a relation or value root.
    fn statement(&mut self, root: &NodeRef) -> Result<String, CompilationError> {
        if root.is_relation() {
            return self.select(root);
        }
        let name = root.name().unwrap_or_else(|_| "result".to_string());
        let scalar = root.output().is_scalar();
        match column_tables(root).into_iter().next() {
            Some(table) => {
                let from = self.relation(&table)?;
                self.scopes.push(vec![(table, from.clone())]);
                let text = self.expr(root, scalar);
                self.scopes.pop();
                Ok(format!(
                    "SELECT {} AS {}{}FROM {}",
                    text?,
                    quote_ident(&name),
                    self.sep(),
                    from
                ))
            }
            None => Ok(format!("SELECT {} AS {}", self.expr(root, scalar)?, quote_ident(&name))),
        }
    }

    /// Name a relation is referenced by, emitting a CTE the first time a
    /// derived relation is seen.
    fn relation(&mut self, node: &NodeRef) -> Result<String, CompilationError> {
        match node.op() {
            Op::UnboundTable { name, .. } | Op::DatabaseTable { name, .. } => {
                return Ok(quote_ident(name))
            }
            _ => {}
        }
        if let Some(name) = self.refs.get(node) {
            return Ok(name.clone());
        }
        let body = self.select(node)?;
        let name = format!("t{}", self.ctes.len());
        self.ctes.push((name.clone(), body));
        self.refs.insert(node.clone(), name.clone());
        Ok(name)
    }

    /// `SELECT` for one relation, with its inputs as references.
    fn select(&mut self, node: &NodeRef) -> Result<String, CompilationError> {
        let sep = self.sep();
        match node.op() {
            Op::UnboundTable { .. } | Op::DatabaseTable { .. } => {
                Ok(format!("SELECT *{}FROM {}", sep, self.relation(node)?))
            }

            Op::Projection { table, selections } => {
                let from = self.relation(table)?;
                let cols = self.scoped(table, &from, |this| {
                    selections
                        .iter()
                        .map(|sel| this.named(sel, false))
                        .collect::<Result<Vec<_>, _>>()
                })?;
                Ok(format!("SELECT {}{}FROM {}", cols.join(", "), sep, from))
            }

            Op::Filter { table, predicates } => {
                let from = self.relation(table)?;
                let preds = self.scoped(table, &from, |this| this.exprs(predicates, false))?;
                Ok(format!(
                    "SELECT *{}FROM {}{}WHERE {}",
                    sep,
                    from,
                    sep,
                    preds.join(" AND ")
                ))
            }

            Op::Sort { table, keys } => {
                let from = self.relation(table)?;
                let keys = self.scoped(table, &from, |this| this.exprs(keys, false))?;
                Ok(format!(
                    "SELECT *{}FROM {}{}ORDER BY {}",
                    sep,
                    from,
                    sep,
                    keys.join(", ")
                ))
            }

            Op::Limit { table, n, offset } => {
                let from = self.relation(table)?;
                let mut sql = format!("SELECT *{}FROM {}{}LIMIT {}", sep, from, sep, n);
                if *offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
                Ok(sql)
            }

            Op::Aggregation { table, metrics, by } => {
                let from = self.relation(table)?;
                let (keys, cols) = self.scoped(table, &from, |this| {
                    let keys = this.exprs(by, false)?;
                    let mut cols = by
                        .iter()
                        .map(|key| this.named(key, false))
                        .collect::<Result<Vec<_>, _>>()?;
                    for metric in metrics {
                        cols.push(this.named(metric, true)?);
                    }
                    Ok((keys, cols))
                })?;
                let mut sql = format!("SELECT {}{}FROM {}", cols.join(", "), sep, from);
                if !keys.is_empty() {
                    sql.push_str(&format!("{}GROUP BY {}", sep, keys.join(", ")));
                }
                Ok(sql)
            }

            Op::Join {
                kind,
                left,
                right,
                predicates,
            } => self.join(*kind, left, right, predicates),

            Op::SetOp {
                kind,
                left,
                right,
                distinct,
            } => {
                let l = self.relation(left)?;
                let r = self.relation(right)?;
                let op = match kind {
                    SetOpKind::Union => "UNION",
                    SetOpKind::Intersect => "INTERSECT",
                    SetOpKind::Difference => "EXCEPT",
                };
                let all = if *distinct { "" } else { " ALL" };
                Ok(format!(
                    "SELECT *{}FROM {}{}{}{}{}SELECT *{}FROM {}",
                    sep, l, sep, op, all, sep, sep, r
                ))
            }

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
        let sep = self.sep();
        let l = self.relation(left)?;
        let r = self.relation(right)?;
        self.scopes
            .push(vec![(left.clone(), "l".to_string()), (right.clone(), "r".to_string())]);
        let preds = self.exprs(predicates, false);
        self.scopes.pop();
        let on = match preds?.as_slice() {
            [] => "TRUE".to_string(),
            preds => preds.join(" AND "),
        };

        if kind.is_filtering() {
            let not = if kind == JoinKind::Anti { "NOT " } else { "" };
            return Ok(format!(
                "SELECT l.*{}FROM {} AS l{}WHERE {}EXISTS (SELECT 1 FROM {} AS r WHERE {})",
                sep, l, sep, not, r, on
            ));
        }

        let left_schema = left.schema().cloned().unwrap_or_default();
        let right_schema = right.schema().cloned().unwrap_or_default();
        let mut cols: Vec<String> = left_schema
            .names()
            .map(|name| format!("l.{}", quote_ident(name)))
            .collect();
        for name in right_schema.names() {
            if left_schema.contains(name) {
                cols.push(format!(
                    "r.{} AS {}",
                    quote_ident(name),
                    quote_ident(&format!("{}_right", name))
                ));
            } else {
                cols.push(format!("r.{}", quote_ident(name)));
            }
        }
        let join = match kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Outer => "FULL OUTER JOIN",
            JoinKind::Semi | JoinKind::Anti => unreachable!("filtering joins handled above"),
        };
        Ok(format!(
            "SELECT {}{}FROM {} AS l{}{} {} AS r ON {}",
            cols.join(", "),
            sep,
            l,
            sep,
            join,
            r,
            on
        ))
    }

    fn scoped<T>(
        &mut self,
        table: &NodeRef,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, CompilationError>,
    ) -> Result<T, CompilationError> {
        self.scopes.push(vec![(table.clone(), name.to_string())]);
        let out = f(self);
        self.scopes.pop();
        out
    }

    fn exprs(&mut self, nodes: &[NodeRef], agg: bool) -> Result<Vec<String>, CompilationError> {
        nodes.iter().map(|n| self.expr(n, agg)).collect()
    }

    /// A select-list entry, aliased unless it is already the named column.
    fn named(&mut self, node: &NodeRef, agg: bool) -> Result<String, CompilationError> {
        let text = self.expr(node, agg)?;
        let name = node.name()?;
        match node.op() {
            Op::TableColumn { name: col, .. } if *col == name => Ok(text),
            _ => Ok(format!("{} AS {}", text, quote_ident(&name))),
        }
    }

    fn column(&mut self, table: &NodeRef, name: &str) -> Result<String, CompilationError> {
        let qualifier = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(t, _)| t == table)
            .map(|(_, alias)| alias.clone());
        let qualifier = match qualifier {
            Some(q) => q,
            None => self.relation(table)?,
        };
        Ok(format!("{}.{}", qualifier, quote_ident(name)))
    }

    /// Render a value. `agg` is set inside aggregation metrics, where
    /// reductions apply to the current group.
    fn expr(&mut self, node: &NodeRef, agg: bool) -> Result<String, CompilationError> {
        match node.op() {
            Op::Literal { value, dtype } => self.literal(value, dtype),

            Op::TableColumn { table, name } => self.column(table, name),

            Op::Alias { arg, .. } => self.expr(arg, agg),

            Op::Binary { op, left, right } => {
                let l = self.expr(left, agg)?;
                let r = self.expr(right, agg)?;
                Ok(format!("({} {} {})", l, op.symbol(), r))
            }

            Op::Unary { op, arg } => {
                let x = self.expr(arg, agg)?;
                Ok(match op {
                    UnaryOp::Not => format!("(NOT {})", x),
                    UnaryOp::Negate => format!("(-{})", x),
                    UnaryOp::IsNull => format!("({} IS NULL)", x),
                    UnaryOp::NotNull => format!("({} IS NOT NULL)", x),
                    UnaryOp::Abs => format!("ABS({})", x),
                    UnaryOp::Floor => format!("CAST(FLOOR({}) AS BIGINT)", x),
                    UnaryOp::Ceil => format!("CAST(CEIL({}) AS BIGINT)", x),
                })
            }

            Op::Cast { arg, to } => {
                let x = self.expr(arg, agg)?;
                Ok(format!("CAST({} AS {})", x, self.type_name(to)?))
            }

            Op::IsIn { arg, options } => {
                let x = self.expr(arg, agg)?;
                let opts = self.exprs(options, agg)?;
                Ok(format!("({} IN ({}))", x, opts.join(", ")))
            }

            Op::Like { arg, pattern } => {
                let x = self.expr(arg, agg)?;
                Ok(format!("({} LIKE {})", x, quote_string(pattern)))
            }

            Op::Extract { part, arg } => {
                let x = self.expr(arg, agg)?;
                let part = match part {
                    DatePart::DayOfWeek => "dow",
                    other => other.name(),
                };
                Ok(format!("EXTRACT({} FROM {})", part, x))
            }

            Op::SearchedCase {
                conditions,
                results,
                default,
            } => {
                let mut sql = "CASE".to_string();
                for (cond, result) in conditions.iter().zip(results) {
                    let c = self.expr(cond, agg)?;
                    let r = self.expr(result, agg)?;
                    sql.push_str(&format!(" WHEN {} THEN {}", c, r));
                }
                sql.push_str(&format!(" ELSE {} END", self.expr(default, agg)?));
                Ok(sql)
            }

            Op::Reduction { .. } | Op::CountStar { .. } if !agg => self.scalar_subquery(node),
            Op::Udf { func, .. } if func.kind() == UdfKind::Reduction && !agg => {
                self.scalar_subquery(node)
            }
            Op::Reduction { func, arg, filter } => self.reduction(*func, arg, filter.as_ref()),
            Op::CountStar { .. } => Ok("COUNT(*)".to_string()),

            Op::Udf { func, args } => {
                let args = self.exprs(args, agg)?;
                Ok(format!("{}({})", quote_ident(func.name()), args.join(", ")))
            }

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
                Ok(format!("{} {}", x, if *ascending { "ASC" } else { "DESC" }))
            }

            Op::Bucket { .. } => {
                let expanded = expand_bucket(&Expr::try_from_node(node.clone())?)?;
                self.expr(expanded.node(), agg)
            }

            Op::Histogram { .. } => {
                let expanded = expand_histogram(&Expr::try_from_node(node.clone())?)?;
                self.expr(expanded.node(), agg)
            }

            Op::TopK { .. } => self.top_values(node, agg),
            Op::SummaryFilter { expr } => self.top_values(expr, agg),

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
            ReductionFunc::Sum => "SUM",
            ReductionFunc::Mean => "AVG",
            ReductionFunc::Min => "MIN",
            ReductionFunc::Max => "MAX",
            ReductionFunc::Count => "COUNT",
            ReductionFunc::Std => "STDDEV_SAMP",
            ReductionFunc::Var => "VAR_SAMP",
        };
        let mut sql = format!("{}({})", name, self.expr(arg, true)?);
        if let Some(filter) = filter {
            sql.push_str(&format!(" FILTER (WHERE {})", self.expr(filter, true)?));
        }
        Ok(sql)
    }

    /// A reduction outside an aggregation, computed over its whole table.
    fn scalar_subquery(&mut self, node: &NodeRef) -> Result<String, CompilationError> {
        let table = match node.op() {
            Op::CountStar { table } => table.clone(),
            _ => column_tables(node)
                .into_iter()
                .next()
                .ok_or_else(|| self.unsupported("reduction without a table"))?,
        };
        let from = self.relation(&table)?;
        let text = self.scoped(&table, &from, |this| this.expr(node, true))?;
        Ok(format!("(SELECT {} FROM {})", text, from))
    }

    /// `arg IN (...)` against the values a top-k keeps.
    fn top_values(&mut self, topk: &NodeRef, agg: bool) -> Result<String, CompilationError> {
        let expr = Expr::try_from_node(topk.clone())?;
        let topk = TopK::from_expr(&expr).ok_or_else(|| self.unsupported("summary filter"))?;
        let arg = topk.arg();
        let ranked = self.relation(topk.to_aggregation()?.node())?;
        let x = self.expr(arg.node(), agg)?;
        Ok(format!(
            "({} IN (SELECT {} FROM {}))",
            x,
            quote_ident(&arg.name()?),
            ranked
        ))
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
            Op::RowNumber => ("ROW_NUMBER()".to_string(), false, true),
            Op::Rank { arg, dense } => {
                order.insert(0, format!("{} ASC", self.expr(arg, false)?));
                let name = if *dense { "DENSE_RANK()" } else { "RANK()" };
                (name.to_string(), false, true)
            }
            Op::Shift { kind, arg, offset } => {
                let name = match kind {
                    ShiftKind::Lag => "LAG",
                    ShiftKind::Lead => "LEAD",
                };
                let x = self.expr(arg, false)?;
                (format!("{}({}, {})", name, x, offset), false, false)
            }
            Op::Reduction { func, arg, filter } => {
                (self.reduction(*func, arg, filter.as_ref())?, true, false)
            }
            Op::CountStar { .. } => ("COUNT(*)".to_string(), true, false),
            Op::Udf { func, args } => {
                let args = self.exprs(args, false)?;
                (format!("{}({})", quote_ident(func.name()), args.join(", ")), true, false)
            }
            _ => return Err(self.unsupported(format!("{} over a window", func.kind().name()))),
        };

        let mut spec = Vec::new();
        if !partition.is_empty() {
            spec.push(format!("PARTITION BY {}", partition.join(", ")));
        }
        if !order.is_empty() {
            spec.push(format!("ORDER BY {}", order.join(", ")));
        }
        if let (true, Some((kind, start, end))) = (framed, frame) {
            let unit = match kind {
                FrameKind::Rows => "ROWS",
                FrameKind::Range => "RANGE",
            };
            spec.push(format!(
                "{} BETWEEN {} AND {}",
                unit,
                self.bound(start, true)?,
                self.bound(end, false)?
            ));
        }
        let sql = format!("{} OVER ({})", call, spec.join(" "));
        Ok(if zero_based {
            format!("({} - 1)", sql)
        } else {
            sql
        })
    }

    fn bound(&self, bound: &FrameBound, is_start: bool) -> Result<String, CompilationError> {
        Ok(match bound {
            FrameBound::Unbounded if is_start => "UNBOUNDED PRECEDING".to_string(),
            FrameBound::Unbounded => "UNBOUNDED FOLLOWING".to_string(),
            FrameBound::CurrentRow => "CURRENT ROW".to_string(),
            FrameBound::Preceding(v) => format!("{} PRECEDING", self.offset(v)?),
            FrameBound::Following(v) => format!("{} FOLLOWING", self.offset(v)?),
        })
    }

    fn offset(&self, value: &Value) -> Result<String, CompilationError> {
        match value {
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(format!("{:?}", f)),
            Value::Interval { value, unit } => Ok(format!("INTERVAL {} {}", value, unit.sql_name())),
            other => Err(self.unsupported(format!("frame offset {}", other))),
        }
    }

    fn literal(&self, value: &Value, dtype: &DataType) -> Result<String, CompilationError> {
        Ok(match value {
            Value::Null if dtype.is_null() => "NULL".to_string(),
            Value::Null => format!("CAST(NULL AS {})", self.type_name(dtype)?),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => format!("{:?}", f),
            Value::Float(f) => format!("CAST('{}' AS DOUBLE)", f),
            Value::String(s) if dtype.is_temporal() => {
                format!("{} {}", self.type_name(dtype)?, quote_string(s))
            }
            Value::String(s) => quote_string(s),
            Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Interval { value, unit } => format!("INTERVAL {} {}", value, unit.sql_name()),
        })
    }

    fn type_name(&self, dtype: &DataType) -> Result<String, CompilationError> {
        Ok(match dtype.kind() {
            TypeKind::Null => return Err(self.unsupported("cast to null")),
            TypeKind::Boolean => "BOOLEAN".to_string(),
            TypeKind::Int8 => "TINYINT".to_string(),
            TypeKind::Int16 => "SMALLINT".to_string(),
            TypeKind::Int32 => "INTEGER".to_string(),
            TypeKind::Int64 | TypeKind::Category { .. } => "BIGINT".to_string(),
            TypeKind::UInt8 => "UTINYINT".to_string(),
            TypeKind::UInt16 => "USMALLINT".to_string(),
            TypeKind::UInt32 => "UINTEGER".to_string(),
            TypeKind::UInt64 => "UBIGINT".to_string(),
            TypeKind::Float32 => "REAL".to_string(),
            TypeKind::Float64 => "DOUBLE".to_string(),
            TypeKind::Decimal {
                precision: Some(p),
                scale,
            } => format!("DECIMAL({}, {})", p, scale.unwrap_or(0)),
            TypeKind::Decimal { .. } => "DECIMAL".to_string(),
            TypeKind::String => "VARCHAR".to_string(),
            TypeKind::Binary => "BLOB".to_string(),
            TypeKind::Date => "DATE".to_string(),
            TypeKind::Time => "TIME".to_string(),
            TypeKind::Timestamp { timezone: None } => "TIMESTAMP".to_string(),
            TypeKind::Timestamp { .. } => "TIMESTAMPTZ".to_string(),
            TypeKind::Interval { .. } => "INTERVAL".to_string(),
            TypeKind::Array(inner) => format!("{}[]", self.type_name(inner)?),
            TypeKind::Map(k, v) => format!("MAP({}, {})", self.type_name(k)?, self.type_name(v)?),
            TypeKind::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, ty)| Ok(format!("{} {}", quote_ident(name), self.type_name(ty)?)))
                    .collect::<Result<Vec<_>, CompilationError>>()?;
                format!("STRUCT({})", fields.join(", "))
            }
        })
    }
}

/// Quote an identifier to prevent SQL injection.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tessera_ir::{trailing_range_window, typed_lit, RankBy, Table};
    use tessera_types::IntervalUnit;

    fn sql(root: &NodeRef) -> String {
        to_sql("duckdb", root, false).unwrap()
    }

    fn table() -> Table {
        Table::unbound(
            "t",
            &[("g", "string"), ("v", "float64"), ("n", "int64"), ("ts", "timestamp")],
        )
        .unwrap()
    }

    #[test]
    fn test_simple_table() {
        assert_eq!(sql(table().node()), "SELECT * FROM \"t\"");
    }

    #[test]
    fn test_filter() {
        let t = table();
        let f = t.filter([t.col("n").unwrap().gt(1).unwrap()]).unwrap();
        assert_eq!(sql(f.node()), "SELECT * FROM \"t\" WHERE (\"t\".\"n\" > 1)");
    }

    #[test]
    fn test_derived_relations_become_ctes() {
        let t = table();
        let f = t.filter([t.col("n").unwrap().gt(1).unwrap()]).unwrap();
        let p = f
            .select([f.col("n").unwrap(), f.col("v").unwrap().mul(2).unwrap().alias("w").unwrap()])
            .unwrap();
        assert_eq!(
            sql(p.node()),
            "WITH t0 AS (SELECT * FROM \"t\" WHERE (\"t\".\"n\" > 1)) \
             SELECT t0.\"n\", (t0.\"v\" * 2) AS \"w\" FROM t0"
        );
    }

    #[test]
    fn test_shared_relation_emitted_once() {
        let t = table();
        let f = t.filter([t.col("n").unwrap().gt(1).unwrap()]).unwrap();
        let u = f.union(&f, true).unwrap();
        let text = sql(u.node());
        assert_eq!(text.matches(" AS (").count(), 1);
        assert!(text.ends_with("SELECT * FROM t0 UNION SELECT * FROM t0"));
    }

    #[test]
    fn test_aggregate() {
        let t = table();
        let agg = t
            .group_by(["g"])
            .unwrap()
            .aggregate([t.col("v").unwrap().sum().unwrap()])
            .unwrap();
        assert_eq!(
            sql(agg.node()),
            "SELECT \"t\".\"g\", SUM(\"t\".\"v\") AS \"v\" FROM \"t\" GROUP BY \"t\".\"g\""
        );
    }

    #[test]
    fn test_sort_and_limit() {
        let t = table();
        let out = t
            .order_by([t.col("v").unwrap().desc().unwrap()])
            .unwrap()
            .limit_offset(10, 5)
            .unwrap();
        let text = sql(out.node());
        assert!(text.contains("ORDER BY \"t\".\"v\" DESC"));
        assert!(text.ends_with("SELECT * FROM t0 LIMIT 10 OFFSET 5"));
    }

    #[test]
    fn test_trailing_range_window() {
        let t = table();
        let w = trailing_range_window(Value::interval(3, IntervalUnit::Day))
            .group_by(["g"])
            .order_by(["ts"]);
        let m = t.col("v").unwrap().mean().unwrap().over(&w).unwrap();
        let out = t.mutate([m.alias("avg3").unwrap()]).unwrap();
        assert!(sql(out.node()).contains(
            "AVG(\"t\".\"v\") OVER (PARTITION BY \"t\".\"g\" ORDER BY \"t\".\"ts\" ASC \
             RANGE BETWEEN INTERVAL 3 DAY PRECEDING AND CURRENT ROW) AS \"avg3\""
        ));
    }

    #[test]
    fn test_bucket_renders_case() {
        let t = table();
        let b = t.col("v").unwrap().bucket([0, 10, 20]).build().unwrap();
        let out = t.select([b.alias("bin").unwrap()]).unwrap();
        let text = sql(out.node());
        assert!(text.contains("CASE WHEN"));
        assert!(text.contains("ELSE CAST(NULL AS BIGINT) END AS \"bin\""));
    }

    #[test]
    fn test_topk_filter_is_exists() {
        let t = table();
        let topk = t.col("g").unwrap().topk(3, RankBy::Count).unwrap();
        let text = sql(t.filter([&topk]).unwrap().node());
        assert!(text.contains("WHERE EXISTS (SELECT 1 FROM"));
        assert!(text.contains("COUNT(*) AS \"count\""));
        assert!(text.contains("LIMIT 3"));
    }

    #[test]
    #[allow(deprecated)]
    fn test_summary_filter_is_in_subquery() {
        let t = table();
        let topk = t.col("g").unwrap().topk(2, RankBy::Count).unwrap();
        let text = sql(t.filter([topk.to_filter().unwrap()]).unwrap().node());
        assert!(text.contains("(\"t\".\"g\" IN (SELECT \"g\" FROM t"));
    }

    #[test]
    fn test_reduction_outside_aggregate_is_subquery() {
        let t = table();
        let v = t.col("v").unwrap();
        let f = t.filter([v.gt(v.mean().unwrap()).unwrap()]).unwrap();
        assert_eq!(
            sql(f.node()),
            "SELECT * FROM \"t\" WHERE (\"t\".\"v\" > (SELECT AVG(\"t\".\"v\") FROM \"t\"))"
        );
    }

    #[test]
    fn test_join_suffixes_clashing_columns() {
        let a = Table::unbound("a", &[("k", "int64"), ("x", "string")]).unwrap();
        let b = Table::unbound("b", &[("k", "int64"), ("y", "string")]).unwrap();
        let j = a
            .join(&b, [a.col("k").unwrap().eq(b.col("k").unwrap()).unwrap()])
            .unwrap();
        assert_eq!(
            sql(j.node()),
            "SELECT l.\"k\", l.\"x\", r.\"k\" AS \"k_right\", r.\"y\" FROM \"a\" AS l \
             INNER JOIN \"b\" AS r ON (l.\"k\" = r.\"k\")"
        );
    }

    #[test]
    fn test_anti_join() {
        let a = Table::unbound("a", &[("k", "int64")]).unwrap();
        let b = Table::unbound("b", &[("k", "int64")]).unwrap();
        let j = a
            .anti_join(&b, [a.col("k").unwrap().eq(b.col("k").unwrap()).unwrap()])
            .unwrap();
        assert!(sql(j.node()).contains("WHERE NOT EXISTS (SELECT 1 FROM \"b\" AS r"));
    }

    #[test]
    fn test_literals() {
        let midnight = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let t = table();
        let f = t
            .filter([
                t.col("ts").unwrap().gt(midnight).unwrap(),
                t.col("g").unwrap().eq("it's").unwrap(),
            ])
            .unwrap();
        let text = sql(f.node());
        assert!(text.contains("TIMESTAMP '2024-02-29 00:00:00'"));
        assert!(text.contains("'it''s'"));
        let null = typed_lit(Value::Null, DataType::float64()).unwrap();
        assert_eq!(sql(null.node()), "SELECT CAST(NULL AS DOUBLE) AS \"result\"");
    }

    #[test]
    fn test_value_root() {
        let t = table();
        let total = t.col("v").unwrap().sum().unwrap();
        assert_eq!(sql(total.node()), "SELECT SUM(\"t\".\"v\") AS \"v\" FROM \"t\"");
    }

    #[test]
    fn test_pretty() {
        let t = table();
        let f = t.filter([t.col("n").unwrap().gt(1).unwrap()]).unwrap();
        let s = f.select(["n"]).unwrap();
        assert_eq!(
            to_sql("duckdb", s.node(), true).unwrap(),
            "WITH t0 AS (\n  SELECT *\n  FROM \"t\"\n  WHERE (\"t\".\"n\" > 1)\n)\nSELECT t0.\"n\"\nFROM t0"
        );
    }

    #[test]
    fn test_quote_ident_injection() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_registered_tables() {
        let backend = SqlBackend::named("warehouse")
            .with_table("orders", Schema::from_pairs(&[("id", "int64")]).unwrap());
        assert_eq!(backend.table_schema("orders").unwrap().len(), 1);
        assert!(backend.table_schema("users").is_err());
    }
}
