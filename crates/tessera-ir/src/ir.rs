//! Operation definitions.

use std::fmt;
use std::str::FromStr;

use tessera_types::{DataType, Schema, Value};

use crate::analytics::udf::UdfFunction;
use crate::error::ValidationError;
use crate::node::NodeRef;

/// An operation. Relations produce tables, everything else produces a
/// column or a scalar.
#[derive(Debug, Clone)]
pub enum Op {
    // Relations
    UnboundTable {
        name: String,
        schema: Schema,
    },
    DatabaseTable {
        name: String,
        schema: Schema,
        source: String,
    },
    Projection {
        table: NodeRef,
        selections: Vec<NodeRef>,
    },
    Filter {
        table: NodeRef,
        predicates: Vec<NodeRef>,
    },
    Sort {
        table: NodeRef,
        keys: Vec<NodeRef>,
    },
    Limit {
        table: NodeRef,
        n: u64,
        offset: u64,
    },
    Aggregation {
        table: NodeRef,
        metrics: Vec<NodeRef>,
        by: Vec<NodeRef>,
    },
    Join {
        kind: JoinKind,
        left: NodeRef,
        right: NodeRef,
        predicates: Vec<NodeRef>,
    },
    SetOp {
        kind: SetOpKind,
        left: NodeRef,
        right: NodeRef,
        distinct: bool,
    },

    // Values
    Literal {
        value: Value,
        dtype: DataType,
    },
    TableColumn {
        table: NodeRef,
        name: String,
    },
    Alias {
        arg: NodeRef,
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
    },
    Unary {
        op: UnaryOp,
        arg: NodeRef,
    },
    Cast {
        arg: NodeRef,
        to: DataType,
    },
    IsIn {
        arg: NodeRef,
        options: Vec<NodeRef>,
    },
    Like {
        arg: NodeRef,
        pattern: String,
    },
    Extract {
        part: DatePart,
        arg: NodeRef,
    },
    SearchedCase {
        conditions: Vec<NodeRef>,
        results: Vec<NodeRef>,
        default: NodeRef,
    },
    Reduction {
        func: ReductionFunc,
        arg: NodeRef,
        filter: Option<NodeRef>,
    },
    CountStar {
        table: NodeRef,
    },
    RowNumber,
    Rank {
        arg: NodeRef,
        dense: bool,
    },
    Shift {
        kind: ShiftKind,
        arg: NodeRef,
        offset: i64,
    },
    WindowFunction {
        func: NodeRef,
        group_by: Vec<NodeRef>,
        order_by: Vec<NodeRef>,
        frame: FrameKind,
        start: FrameBound,
        end: FrameBound,
    },
    SortKey {
        expr: NodeRef,
        ascending: bool,
    },

    // Analytics
    Bucket {
        arg: NodeRef,
        edges: Vec<Value>,
        closed: Closed,
        close_extreme: bool,
        include_under: bool,
        include_over: bool,
    },
    Histogram {
        arg: NodeRef,
        nbins: Option<u64>,
        binwidth: Option<Value>,
        base: Option<Value>,
        closed: Closed,
    },
    TopK {
        arg: NodeRef,
        k: u64,
        by: NodeRef,
    },
    SummaryFilter {
        expr: NodeRef,
    },
    Udf {
        func: UdfFunction,
        args: Vec<NodeRef>,
    },
}

impl Op {
    /// Number of buckets a `Bucket` produces.
    pub fn nbuckets(&self) -> Option<usize> {
        match self {
            Op::Bucket {
                edges,
                include_under,
                include_over,
                ..
            } => Some(
                edges.len().saturating_sub(1) + *include_under as usize + *include_over as usize,
            ),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            Op::UnboundTable { .. }
                | Op::DatabaseTable { .. }
                | Op::Projection { .. }
                | Op::Filter { .. }
                | Op::Sort { .. }
                | Op::Limit { .. }
                | Op::Aggregation { .. }
                | Op::Join { .. }
                | Op::SetOp { .. }
        )
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    NotNull,
    Abs,
    Floor,
    Ceil,
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
    Semi,
    Anti,
}

impl JoinKind {
    /// Semi and anti joins keep only the left table's columns.
    pub fn is_filtering(&self) -> bool {
        matches!(self, JoinKind::Semi | JoinKind::Anti)
    }
}

/// Set operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOpKind {
    Union,
    Intersect,
    Difference,
}

/// Reduction functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionFunc {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Std,
    Var,
}

impl ReductionFunc {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionFunc::Sum => "sum",
            ReductionFunc::Mean => "mean",
            ReductionFunc::Min => "min",
            ReductionFunc::Max => "max",
            ReductionFunc::Count => "count",
            ReductionFunc::Std => "std",
            ReductionFunc::Var => "var",
        }
    }
}

/// Fields extracted from temporal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    Day,
    DayOfWeek,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn name(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Quarter => "quarter",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::DayOfWeek => "dayofweek",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        }
    }

    /// Whether the part only exists on values with a time component.
    pub fn needs_time(&self) -> bool {
        matches!(self, DatePart::Hour | DatePart::Minute | DatePart::Second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftKind {
    Lag,
    Lead,
}

/// Which side of a bin interval is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Closed {
    #[default]
    Left,
    Right,
}

impl Closed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Closed::Left => "left",
            Closed::Right => "right",
        }
    }
}

impl FromStr for Closed {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Closed::Left),
            "right" => Ok(Closed::Right),
            other => Err(ValidationError::InvalidClosed(other.to_string())),
        }
    }
}

/// Window frame units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameKind {
    #[default]
    Rows,
    Range,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Rows => "rows",
            FrameKind::Range => "range",
        }
    }
}

impl FromStr for FrameKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rows" => Ok(FrameKind::Rows),
            "range" => Ok(FrameKind::Range),
            other => Err(ValidationError::Frame(format!("unknown frame kind '{}'", other))),
        }
    }
}

/// One end of a window frame, relative to the current row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FrameBound {
    #[default]
    Unbounded,
    Preceding(Value),
    CurrentRow,
    Following(Value),
}

impl FrameBound {
    pub fn offset(&self) -> Option<&Value> {
        match self {
            FrameBound::Preceding(v) | FrameBound::Following(v) => Some(v),
            _ => None,
        }
    }

    /// Signed position used to check that a frame's start precedes its end.
    pub(crate) fn position(&self, is_start: bool) -> Option<f64> {
        match self {
            FrameBound::Unbounded if is_start => Some(f64::NEG_INFINITY),
            FrameBound::Unbounded => Some(f64::INFINITY),
            FrameBound::CurrentRow => Some(0.0),
            FrameBound::Preceding(v) => interval_or_number(v).map(|n| -n),
            FrameBound::Following(v) => interval_or_number(v),
        }
    }
}

fn interval_or_number(value: &Value) -> Option<f64> {
    match value {
        Value::Interval { value, .. } => Some(*value as f64),
        other => other.as_f64(),
    }
}

impl fmt::Display for FrameBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::Unbounded => write!(f, "unbounded"),
            FrameBound::Preceding(v) => write!(f, "{} preceding", v),
            FrameBound::CurrentRow => write!(f, "current row"),
            FrameBound::Following(v) => write!(f, "{} following", v),
        }
    }
}
