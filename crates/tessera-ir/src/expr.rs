//! User-facing table and column expressions.
//!
//! [`Table`] and [`Expr`] are thin wrappers over a root [`NodeRef`]. Every
//! method builds a new node and returns a new wrapper; nothing is mutated.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use tessera_types::{DataType, Schema, Value};

use crate::analytics::topk::TopK;
use crate::error::IrError;
use crate::ir::{BinaryOp, DatePart, JoinKind, Op, ReductionFunc, SetOpKind, ShiftKind, UnaryOp};
use crate::lineage::{rebase, Reach};
use crate::node::{Node, NodeRef, OpKind};

/// A relation expression.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Table {
    node: NodeRef,
}

/// A column or scalar expression.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    node: NodeRef,
}

/// Anything usable where an expression is expected.
pub trait IntoExpr {
    fn into_expr(self) -> Result<Expr, IrError>;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Result<Expr, IrError> {
        Ok(self)
    }
}

impl IntoExpr for &Expr {
    fn into_expr(self) -> Result<Expr, IrError> {
        Ok(self.clone())
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Result<Expr, IrError> {
        lit(self)
    }
}

macro_rules! literal_into_expr {
    ($($ty:ty),*) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Result<Expr, IrError> {
                    lit(self)
                }
            }
        )*
    };
}

literal_into_expr!(bool, i32, i64, f64, &str, String, NaiveDate, NaiveDateTime);

/// A literal, typed by inference.
pub fn lit(value: impl Into<Value>) -> Result<Expr, IrError> {
    let value = value.into();
    let dtype = value.infer_type();
    Node::new(Op::Literal { value, dtype }).map(Expr::from_node)
}

/// A literal with an explicit type.
pub fn typed_lit(value: impl Into<Value>, dtype: DataType) -> Result<Expr, IrError> {
    Node::new(Op::Literal {
        value: value.into(),
        dtype,
    })
    .map(Expr::from_node)
}

/// Position of each row within its window, starting at zero.
pub fn row_number() -> Result<Expr, IrError> {
    Node::new(Op::RowNumber).map(Expr::from_node)
}

/// Start a searched `CASE` expression.
pub fn case() -> CaseBuilder {
    CaseBuilder::default()
}

#[derive(Default, Clone)]
pub struct CaseBuilder {
    conditions: Vec<Expr>,
    results: Vec<Expr>,
}

impl CaseBuilder {
    pub fn when(mut self, condition: impl IntoExpr, result: impl IntoExpr) -> Result<Self, IrError> {
        self.conditions.push(condition.into_expr()?);
        self.results.push(result.into_expr()?);
        Ok(self)
    }

    /// Finish the expression with the value used when no condition holds.
    pub fn otherwise(self, default: impl IntoExpr) -> Result<Expr, IrError> {
        Node::new(Op::SearchedCase {
            conditions: self.conditions.into_iter().map(Expr::into_node).collect(),
            results: self.results.into_iter().map(Expr::into_node).collect(),
            default: default.into_expr()?.into_node(),
        })
        .map(Expr::from_node)
    }

    pub fn end(self) -> Result<Expr, IrError> {
        self.otherwise(Value::Null)
    }
}

/// One item of a selection list.
#[derive(Clone)]
pub enum Selection {
    /// A column of the table being selected from.
    Name(String),
    Expr(Expr),
    /// Every column of a table.
    Table(Table),
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Selection::Name(name.to_string())
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Selection::Name(name)
    }
}

impl From<Expr> for Selection {
    fn from(expr: Expr) -> Self {
        Selection::Expr(expr)
    }
}

impl From<&Expr> for Selection {
    fn from(expr: &Expr) -> Self {
        Selection::Expr(expr.clone())
    }
}

impl From<Table> for Selection {
    fn from(table: Table) -> Self {
        Selection::Table(table)
    }
}

impl From<&Table> for Selection {
    fn from(table: &Table) -> Self {
        Selection::Table(table.clone())
    }
}

impl Table {
    /// A schema-only table with no backing data.
    pub fn unbound(name: impl Into<String>, fields: &[(&str, &str)]) -> Result<Self, IrError> {
        Self::from_schema(name, Schema::from_pairs(fields)?)
    }

    pub fn from_schema(name: impl Into<String>, schema: Schema) -> Result<Self, IrError> {
        Node::new(Op::UnboundTable {
            name: name.into(),
            schema,
        })
        .map(Table::from_node)
    }

    /// Wrap a relation node.
    pub fn try_from_node(node: NodeRef) -> Result<Self, IrError> {
        if node.is_relation() {
            Ok(Table { node })
        } else {
            Err(IrError::TypeMismatch {
                op: "Table".to_string(),
                arg: "node".to_string(),
                expected: "a table".to_string(),
                found: node.kind().name(),
            })
        }
    }

    pub(crate) fn from_node(node: NodeRef) -> Self {
        Table { node }
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn into_node(self) -> NodeRef {
        self.node
    }

    pub fn schema(&self) -> &Schema {
        match self.node.schema() {
            Some(schema) => schema,
            None => unreachable!("tables wrap relation nodes"),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema().names().map(String::from).collect()
    }

    pub fn col(&self, name: &str) -> Result<Expr, IrError> {
        Node::new(Op::TableColumn {
            table: self.node.clone(),
            name: name.to_string(),
        })
        .map(Expr::from_node)
    }

    /// Resolve one selection item to expressions on this table.
    pub(crate) fn resolve(&self, item: Selection, reach: Reach) -> Result<Vec<Expr>, IrError> {
        match item {
            Selection::Name(name) => Ok(vec![self.col(&name)?]),
            Selection::Expr(expr) => Ok(vec![self.rebase(&expr, reach)?]),
            Selection::Table(table) => {
                let mut out = Vec::with_capacity(table.schema().len());
                for name in table.schema().names() {
                    out.push(self.rebase(&table.col(name)?, Reach::Columns)?);
                }
                Ok(out)
            }
        }
    }

    fn rebase(&self, expr: &Expr, reach: Reach) -> Result<Expr, IrError> {
        rebase(&expr.node, &[&self.node], reach).map(Expr::from_node)
    }

    fn resolve_all<I, S>(&self, items: I, reach: Reach) -> Result<Vec<NodeRef>, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let mut out = Vec::new();
        for item in items {
            out.extend(self.resolve(item.into(), reach)?.into_iter().map(Expr::into_node));
        }
        Ok(out)
    }

    pub fn select<I, S>(&self, items: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let selections = self.resolve_all(items, Reach::Columns)?;
        Node::new(Op::Projection {
            table: self.node.clone(),
            selections,
        })
        .map(Table::from_node)
    }

    /// Add or replace columns. A new column with an existing name takes
    /// that column's position.
    pub fn mutate<I, S>(&self, items: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let mut added = Vec::new();
        for node in self.resolve_all(items, Reach::Columns)? {
            added.push((node.name()?, node));
        }
        let mut selections = Vec::with_capacity(self.schema().len() + added.len());
        for name in self.schema().names() {
            match added.iter().position(|(n, _)| n == name) {
                Some(i) => selections.push(added.remove(i).1),
                None => selections.push(self.col(name)?.into_node()),
            }
        }
        selections.extend(added.into_iter().map(|(_, node)| node));
        Node::new(Op::Projection {
            table: self.node.clone(),
            selections,
        })
        .map(Table::from_node)
    }

    /// Keep rows satisfying every predicate.
    ///
    /// Top-k predicates become a semi-join against their rank set, so the
    /// result is the same relation [`TopK::to_semi_join`] describes.
    pub fn filter<I, E>(&self, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        let mut current = self.clone();
        let mut rest = Vec::new();
        for pred in predicates {
            let pred = pred.into_expr()?;
            match TopK::from_expr(&pred) {
                Some(topk) => {
                    current = topk.to_semi_join(&current)?.select([self])?;
                }
                None => rest.push(pred),
            }
        }
        if rest.is_empty() && current != *self {
            return Ok(current);
        }
        let predicates = rest
            .iter()
            .map(|p| current.rebase(p, Reach::Columns).map(Expr::into_node))
            .collect::<Result<Vec<_>, _>>()?;
        Node::new(Op::Filter {
            table: current.node.clone(),
            predicates,
        })
        .map(Table::from_node)
    }

    /// Sort by the given keys. Bare names and expressions sort ascending.
    pub fn order_by<I, S>(&self, keys: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let mut sort_keys = Vec::new();
        for key in self.resolve_all(keys, Reach::Columns)? {
            let key = Expr::from_node(key);
            sort_keys.push(key.sort_key()?.into_node());
        }
        Node::new(Op::Sort {
            table: self.node.clone(),
            keys: sort_keys,
        })
        .map(Table::from_node)
    }

    pub fn limit(&self, n: u64) -> Result<Table, IrError> {
        self.limit_offset(n, 0)
    }

    pub fn limit_offset(&self, n: u64, offset: u64) -> Result<Table, IrError> {
        Node::new(Op::Limit {
            table: self.node.clone(),
            n,
            offset,
        })
        .map(Table::from_node)
    }

    /// Reduce the whole table to one row.
    pub fn aggregate<I, S>(&self, metrics: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        self.aggregate_by(metrics, Vec::new())
    }

    fn aggregate_by<I, S>(&self, metrics: I, by: Vec<NodeRef>) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let metrics = self.resolve_all(metrics, Reach::Values)?;
        Node::new(Op::Aggregation {
            table: self.node.clone(),
            metrics,
            by,
        })
        .map(Table::from_node)
    }

    pub fn group_by<I, S>(&self, keys: I) -> Result<GroupedTable, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let by = self.resolve_all(keys, Reach::Columns)?;
        Ok(GroupedTable {
            table: self.clone(),
            by,
        })
    }

    /// Number of rows, as a scalar.
    pub fn count(&self) -> Result<Expr, IrError> {
        Node::new(Op::CountStar {
            table: self.node.clone(),
        })
        .map(Expr::from_node)
    }

    pub fn join_with<I, E>(&self, kind: JoinKind, right: &Table, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        let predicates = predicates
            .into_iter()
            .map(|p| {
                let p = p.into_expr()?;
                rebase(&p.node, &[&self.node, &right.node], Reach::Columns)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Node::new(Op::Join {
            kind,
            left: self.node.clone(),
            right: right.node.clone(),
            predicates,
        })
        .map(Table::from_node)
    }

    pub fn join<I, E>(&self, right: &Table, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        self.join_with(JoinKind::Inner, right, predicates)
    }

    pub fn left_join<I, E>(&self, right: &Table, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        self.join_with(JoinKind::Left, right, predicates)
    }

    pub fn semi_join<I, E>(&self, right: &Table, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        self.join_with(JoinKind::Semi, right, predicates)
    }

    pub fn anti_join<I, E>(&self, right: &Table, predicates: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        self.join_with(JoinKind::Anti, right, predicates)
    }

    fn set_op(&self, kind: SetOpKind, other: &Table, distinct: bool) -> Result<Table, IrError> {
        Node::new(Op::SetOp {
            kind,
            left: self.node.clone(),
            right: other.node.clone(),
            distinct,
        })
        .map(Table::from_node)
    }

    pub fn union(&self, other: &Table, distinct: bool) -> Result<Table, IrError> {
        self.set_op(SetOpKind::Union, other, distinct)
    }

    pub fn intersect(&self, other: &Table) -> Result<Table, IrError> {
        self.set_op(SetOpKind::Intersect, other, true)
    }

    pub fn difference(&self, other: &Table) -> Result<Table, IrError> {
        self.set_op(SetOpKind::Difference, other, true)
    }
}

/// A table with grouping keys, waiting for its metrics.
#[derive(Clone)]
pub struct GroupedTable {
    table: Table,
    by: Vec<NodeRef>,
}

impl GroupedTable {
    pub fn aggregate<I, S>(&self, metrics: I) -> Result<Table, IrError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        self.table.aggregate_by(metrics, self.by.clone())
    }

    /// Row count per group, in a column named `count`.
    pub fn count(&self) -> Result<Table, IrError> {
        self.aggregate([self.table.count()?])
    }
}

impl Expr {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        Expr { node }
    }

    /// Wrap a value node.
    pub fn try_from_node(node: NodeRef) -> Result<Self, IrError> {
        if node.is_relation() {
            Err(IrError::TypeMismatch {
                op: "Expr".to_string(),
                arg: "node".to_string(),
                expected: "a value".to_string(),
                found: node.kind().name(),
            })
        } else {
            Ok(Expr { node })
        }
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn into_node(self) -> NodeRef {
        self.node
    }

    pub fn dtype(&self) -> &DataType {
        match self.node.dtype() {
            Some(ty) => ty,
            None => unreachable!("expressions wrap value nodes"),
        }
    }

    pub fn name(&self) -> Result<String, IrError> {
        self.node.name()
    }

    pub fn is_column(&self) -> bool {
        self.node.output().is_column()
    }

    pub fn is_scalar(&self) -> bool {
        self.node.output().is_scalar()
    }

    pub fn alias(&self, name: impl Into<String>) -> Result<Expr, IrError> {
        Node::new(Op::Alias {
            arg: self.node.clone(),
            name: name.into(),
        })
        .map(Expr::from_node)
    }

    fn binary(&self, op: BinaryOp, other: impl IntoExpr) -> Result<Expr, IrError> {
        Node::new(Op::Binary {
            op,
            left: self.node.clone(),
            right: other.into_expr()?.node,
        })
        .map(Expr::from_node)
    }

    fn unary(&self, op: UnaryOp) -> Result<Expr, IrError> {
        Node::new(Op::Unary {
            op,
            arg: self.node.clone(),
        })
        .map(Expr::from_node)
    }

    pub fn add(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Div, other)
    }

    pub fn modulo(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Mod, other)
    }

    pub fn eq(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(&self, other: impl IntoExpr) -> Result<Expr, IrError> {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::Not)
    }

    pub fn negate(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::Negate)
    }

    pub fn is_null(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::IsNull)
    }

    pub fn not_null(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::NotNull)
    }

    pub fn abs(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::Abs)
    }

    pub fn floor(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::Floor)
    }

    pub fn ceil(&self) -> Result<Expr, IrError> {
        self.unary(UnaryOp::Ceil)
    }

    pub fn cast(&self, to: DataType) -> Result<Expr, IrError> {
        Node::new(Op::Cast {
            arg: self.node.clone(),
            to,
        })
        .map(Expr::from_node)
    }

    pub fn isin<I, E>(&self, options: I) -> Result<Expr, IrError>
    where
        I: IntoIterator<Item = E>,
        E: IntoExpr,
    {
        let options = options
            .into_iter()
            .map(|o| o.into_expr().map(Expr::into_node))
            .collect::<Result<Vec<_>, _>>()?;
        Node::new(Op::IsIn {
            arg: self.node.clone(),
            options,
        })
        .map(Expr::from_node)
    }

    /// SQL `LIKE` match against a pattern using `%` and `_`.
    pub fn like(&self, pattern: impl Into<String>) -> Result<Expr, IrError> {
        Node::new(Op::Like {
            arg: self.node.clone(),
            pattern: pattern.into(),
        })
        .map(Expr::from_node)
    }

    pub fn extract(&self, part: DatePart) -> Result<Expr, IrError> {
        Node::new(Op::Extract {
            part,
            arg: self.node.clone(),
        })
        .map(Expr::from_node)
    }

    pub fn year(&self) -> Result<Expr, IrError> {
        self.extract(DatePart::Year)
    }

    pub fn month(&self) -> Result<Expr, IrError> {
        self.extract(DatePart::Month)
    }

    pub fn day(&self) -> Result<Expr, IrError> {
        self.extract(DatePart::Day)
    }

    pub fn hour(&self) -> Result<Expr, IrError> {
        self.extract(DatePart::Hour)
    }

    /// Reduce the column, optionally over only the rows where `filter` holds.
    pub fn reduce(&self, func: ReductionFunc, filter: Option<Expr>) -> Result<Expr, IrError> {
        Node::new(Op::Reduction {
            func,
            arg: self.node.clone(),
            filter: filter.map(Expr::into_node),
        })
        .map(Expr::from_node)
    }

    pub fn sum(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Sum, None)
    }

    pub fn mean(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Mean, None)
    }

    pub fn min(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Min, None)
    }

    pub fn max(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Max, None)
    }

    pub fn count(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Count, None)
    }

    pub fn std(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Std, None)
    }

    pub fn var(&self) -> Result<Expr, IrError> {
        self.reduce(ReductionFunc::Var, None)
    }

    fn sort(&self, ascending: bool) -> Result<Expr, IrError> {
        Node::new(Op::SortKey {
            expr: self.node.clone(),
            ascending,
        })
        .map(Expr::from_node)
    }

    pub fn asc(&self) -> Result<Expr, IrError> {
        self.sort(true)
    }

    pub fn desc(&self) -> Result<Expr, IrError> {
        self.sort(false)
    }

    /// This expression as a sort key, ascending unless it already is one.
    pub(crate) fn sort_key(&self) -> Result<Expr, IrError> {
        if self.node.kind() == OpKind::SortKey {
            Ok(self.clone())
        } else {
            self.asc()
        }
    }

    fn rank_with(&self, dense: bool) -> Result<Expr, IrError> {
        Node::new(Op::Rank {
            arg: self.node.clone(),
            dense,
        })
        .map(Expr::from_node)
    }

    pub fn rank(&self) -> Result<Expr, IrError> {
        self.rank_with(false)
    }

    pub fn dense_rank(&self) -> Result<Expr, IrError> {
        self.rank_with(true)
    }

    fn shift(&self, kind: ShiftKind, offset: i64) -> Result<Expr, IrError> {
        Node::new(Op::Shift {
            kind,
            arg: self.node.clone(),
            offset,
        })
        .map(Expr::from_node)
    }

    pub fn lag(&self, offset: i64) -> Result<Expr, IrError> {
        self.shift(ShiftKind::Lag, offset)
    }

    pub fn lead(&self, offset: i64) -> Result<Expr, IrError> {
        self.shift(ShiftKind::Lead, offset)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Output;
    use std::sync::Arc;

    fn table() -> Table {
        Table::unbound(
            "t",
            &[("a", "int64"), ("b", "float64"), ("g", "string"), ("ts", "timestamp")],
        )
        .unwrap()
    }

    #[test]
    fn test_expressions_are_immutable() {
        let t = table();
        let before = t.clone();
        let filtered = t.filter([t.col("a").unwrap().gt(1).unwrap()]).unwrap();
        assert_eq!(t, before);
        assert_ne!(filtered, t);
        assert_eq!(filtered.schema(), t.schema());
    }

    #[test]
    fn test_select_names_expressions_and_tables() {
        let t = table();
        let doubled = t.col("b").unwrap().mul(2).unwrap().alias("b2").unwrap();
        let out = t.select([Selection::from("a"), doubled.into()]).unwrap();
        assert_eq!(out.columns(), vec!["a", "b2"]);

        let star = t.select([&t]).unwrap();
        assert_eq!(star.schema(), t.schema());
    }

    #[test]
    fn test_unnamed_selection_fails() {
        let t = table();
        let err = t.select([lit(1).unwrap()]).unwrap_err();
        assert!(matches!(err, IrError::UnnamedExpression(_)));
    }

    #[test]
    fn test_parent_columns_move_onto_derived_tables() {
        let t = table();
        let filtered = t.filter([t.col("a").unwrap().gt(0).unwrap()]).unwrap();
        let out = filtered.select([t.col("b").unwrap()]).unwrap();
        assert_eq!(out.columns(), vec!["b"]);
        assert_eq!(out, filtered.select(["b"]).unwrap());
    }

    #[test]
    fn test_foreign_columns_are_rejected() {
        let t = table();
        let other = Table::unbound("u", &[("x", "int64")]).unwrap();
        let err = t.select([other.col("x").unwrap()]).unwrap_err();
        assert!(matches!(err, IrError::Relation(_)));
    }

    #[test]
    fn test_mutate_replaces_in_place() {
        let t = table();
        let out = t
            .mutate([
                t.col("a").unwrap().add(1).unwrap().alias("a").unwrap(),
                t.col("b").unwrap().floor().unwrap().alias("c").unwrap(),
            ])
            .unwrap();
        assert_eq!(out.columns(), vec!["a", "b", "g", "ts", "c"]);
    }

    #[test]
    fn test_group_by_aggregate_schema() {
        let t = table();
        let out = t
            .group_by(["g"])
            .unwrap()
            .aggregate([
                t.col("b").unwrap().mean().unwrap().alias("avg_b").unwrap(),
                t.count().unwrap(),
            ])
            .unwrap();
        assert_eq!(out.columns(), vec!["g", "avg_b", "count"]);
        assert_eq!(out.schema().get("avg_b"), Some(&DataType::float64()));
    }

    #[test]
    fn test_order_by_wraps_plain_keys() {
        let t = table();
        let sorted = t.order_by([Selection::from("a"), t.col("b").unwrap().desc().unwrap().into()]);
        let sorted = sorted.unwrap();
        match sorted.node().op() {
            Op::Sort { keys, .. } => {
                assert!(keys.iter().all(|k| k.kind() == OpKind::SortKey));
                assert!(matches!(keys[1].op(), Op::SortKey { ascending: false, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comparison_with_string_temporal() {
        let t = table();
        let pred = t.col("ts").unwrap().gt_eq("2020-01-01").unwrap();
        assert_eq!(pred.dtype(), &DataType::boolean());
    }

    #[test]
    fn test_case_builder() {
        let t = table();
        let a = t.col("a").unwrap();
        let expr = case()
            .when(a.lt(0).unwrap(), "neg")
            .unwrap()
            .when(a.gt(0).unwrap(), "pos")
            .unwrap()
            .otherwise("zero")
            .unwrap();
        assert_eq!(expr.node().output(), &Output::Column(DataType::string()));
        assert!(expr.name().is_err());
    }

    #[test]
    fn test_union_requires_equal_schemas() {
        let t = table();
        let u = Table::unbound("u", &[("a", "int64")]).unwrap();
        assert!(t.union(&t, false).is_ok());
        assert!(matches!(t.union(&u, false), Err(IrError::Relation(_))));
    }

    #[test]
    fn test_join_predicates_from_both_sides() {
        let t = table();
        let u = Table::unbound("u", &[("g", "string"), ("w", "float64")]).unwrap();
        let joined = t
            .join(&u, [t.col("g").unwrap().eq(u.col("g").unwrap()).unwrap()])
            .unwrap();
        assert_eq!(joined.columns(), vec!["a", "b", "g", "ts", "g_right", "w"]);
        let semi = t
            .semi_join(&u, [t.col("g").unwrap().eq(u.col("g").unwrap()).unwrap()])
            .unwrap();
        assert_eq!(semi.schema(), t.schema());
    }

    #[test]
    fn test_wrapping_checks_shape() {
        let t = table();
        assert!(Expr::try_from_node(t.node().clone()).is_err());
        assert!(Table::try_from_node(t.col("a").unwrap().into_node()).is_err());
        let node = t.node().clone();
        assert!(Arc::ptr_eq(Table::try_from_node(node).unwrap().node(), t.node()));
    }
}
