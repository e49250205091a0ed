//! Top-k filtering.
//!
//! `col.topk(k, by)` names the `k` values of `col` with the largest `by`
//! aggregate. Used as a filter predicate it keeps the rows whose `col` is
//! one of those values, which is exactly a semi-join against the ranked
//! aggregation.

use std::fmt;

use crate::error::IrError;
use crate::expr::{Expr, IntoExpr, Table};
use crate::ir::Op;
use crate::lineage::{column_tables, rebase, Reach};
use crate::node::{Node, OpKind};

/// What the groups are ranked by.
#[derive(Default)]
pub enum RankBy {
    /// Rows per group.
    #[default]
    Count,
    Expr(Expr),
    /// Built from the table the ranked column belongs to.
    Deferred(Box<dyn Fn(&Table) -> Result<Expr, IrError>>),
}

impl From<Expr> for RankBy {
    fn from(expr: Expr) -> Self {
        RankBy::Expr(expr)
    }
}

impl fmt::Debug for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankBy::Count => write!(f, "Count"),
            RankBy::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            RankBy::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

/// A top-k predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopK {
    expr: Expr,
}

impl Expr {
    /// The `k` most frequent values of this column, or the `k` with the
    /// largest `by` aggregate.
    pub fn topk(&self, k: u64, by: RankBy) -> Result<TopK, IrError> {
        let base = self.base_table()?;
        let by = match by {
            RankBy::Count => base.count()?,
            RankBy::Expr(expr) => expr,
            RankBy::Deferred(build) => build(&base)?,
        };
        let node = Node::new(Op::TopK {
            arg: self.node().clone(),
            k,
            by: by.into_node(),
        })?;
        Ok(TopK {
            expr: Expr::from_node(node),
        })
    }

    fn base_table(&self) -> Result<Table, IrError> {
        column_tables(self.node())
            .into_iter()
            .next()
            .map(Table::from_node)
            .ok_or_else(|| IrError::relation("top-k needs a column of a table"))
    }
}

impl TopK {
    /// View a `TopK` expression as a top-k predicate.
    pub fn from_expr(expr: &Expr) -> Option<TopK> {
        (expr.node().kind() == OpKind::TopK).then(|| TopK { expr: expr.clone() })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn arg(&self) -> Expr {
        match self.expr.node().op() {
            Op::TopK { arg, .. } => Expr::from_node(arg.clone()),
            _ => unreachable!("top-k wraps a TopK node"),
        }
    }

    pub fn k(&self) -> u64 {
        match self.expr.node().op() {
            Op::TopK { k, .. } => *k,
            _ => unreachable!("top-k wraps a TopK node"),
        }
    }

    pub fn by(&self) -> Expr {
        match self.expr.node().op() {
            Op::TopK { by, .. } => Expr::from_node(by.clone()),
            _ => unreachable!("top-k wraps a TopK node"),
        }
    }

    fn metric_name(&self) -> Result<String, IrError> {
        let arg_name = self.arg().name()?;
        Ok(match self.by().name() {
            Ok(name) if name != arg_name => name,
            _ => "metric".to_string(),
        })
    }

    /// The top `k` groups: one row per value, with its metric, largest first.
    pub fn to_aggregation(&self) -> Result<Table, IrError> {
        let arg = self.arg();
        let base = arg.base_table()?;
        let metric = self.metric_name()?;
        let ranked = base
            .group_by([&arg])?
            .aggregate([self.by().alias(metric.clone())?])?;
        ranked
            .order_by([ranked.col(&metric)?.desc()?])?
            .limit(self.k())
    }

    /// Semi-join `table` against the top `k` groups.
    pub fn to_semi_join(&self, table: &Table) -> Result<Table, IrError> {
        let arg = self.arg();
        let ranked = self.to_aggregation()?;
        let key = rebase(arg.node(), &[table.node()], Reach::Columns).map(Expr::from_node)?;
        let predicate = key.eq(ranked.col(&arg.name()?)?)?;
        table.semi_join(&ranked, [predicate])
    }

    /// Boolean column marking rows in the top `k` groups.
    #[deprecated(note = "use `to_semi_join` or pass the top-k to `Table::filter`")]
    pub fn to_filter(&self) -> Result<Expr, IrError> {
        tracing::warn!(
            target: "tessera::deprecation",
            k = self.k(),
            "TopK::to_filter is deprecated; use to_semi_join or Table::filter"
        );
        Node::new(Op::SummaryFilter {
            expr: self.expr.node().clone(),
        })
        .map(Expr::from_node)
    }
}

impl IntoExpr for TopK {
    fn into_expr(self) -> Result<Expr, IrError> {
        Ok(self.expr)
    }
}

impl IntoExpr for &TopK {
    fn into_expr(self) -> Result<Expr, IrError> {
        Ok(self.expr.clone())
    }
}
