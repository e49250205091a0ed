//! Immutable, shared IR nodes.
//!
//! A [`Node`] pairs an [`Op`] with the output it was validated to produce.
//! Nodes are only ever handed out as [`NodeRef`]s, so equal sub-graphs can
//! be shared freely between parents.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use tessera_types::{DataType, Schema, Value};

use crate::analytics::udf::UdfFunction;
use crate::error::IrError;
use crate::ir::{
    BinaryOp, DatePart, FrameBound, JoinKind, Op, ReductionFunc, SetOpKind, ShiftKind, UnaryOp,
};

pub type NodeRef = Arc<Node>;

/// The declared result of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Output {
    Table(Schema),
    Column(DataType),
    Scalar(DataType),
}

impl Output {
    pub fn dtype(&self) -> Option<&DataType> {
        match self {
            Output::Column(ty) | Output::Scalar(ty) => Some(ty),
            Output::Table(_) => None,
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        match self {
            Output::Table(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Output::Table(_))
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Output::Column(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Output::Scalar(_))
    }
}

/// Variant tag of an operation, including its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    UnboundTable,
    DatabaseTable,
    Projection,
    Filter,
    Sort,
    Limit,
    Aggregation,
    Join(JoinKind),
    SetOp(SetOpKind),
    Literal,
    TableColumn,
    Alias,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Cast,
    IsIn,
    Like,
    Extract(DatePart),
    SearchedCase,
    Reduction(ReductionFunc),
    CountStar,
    RowNumber,
    Rank,
    Shift(ShiftKind),
    WindowFunction,
    SortKey,
    Bucket,
    Histogram,
    TopK,
    SummaryFilter,
    Udf,
}

impl OpKind {
    pub fn name(&self) -> String {
        match self {
            OpKind::Join(kind) => format!("{:?}Join", kind),
            OpKind::SetOp(kind) => format!("{:?}", kind),
            OpKind::Binary(op) => format!("{:?}", op),
            OpKind::Unary(op) => format!("{:?}", op),
            OpKind::Extract(part) => format!("Extract{:?}", part),
            OpKind::Reduction(func) => format!("{:?}", func),
            OpKind::Shift(kind) => format!("{:?}", kind),
            other => format!("{:?}", other),
        }
    }

    /// Argument names in construction order.
    pub fn argnames(&self) -> &'static [&'static str] {
        match self {
            OpKind::UnboundTable => &["name", "schema"],
            OpKind::DatabaseTable => &["name", "schema", "source"],
            OpKind::Projection => &["table", "selections"],
            OpKind::Filter => &["table", "predicates"],
            OpKind::Sort => &["table", "keys"],
            OpKind::Limit => &["table", "n", "offset"],
            OpKind::Aggregation => &["table", "metrics", "by"],
            OpKind::Join(_) => &["left", "right", "predicates"],
            OpKind::SetOp(_) => &["left", "right", "distinct"],
            OpKind::Literal => &["value", "dtype"],
            OpKind::TableColumn => &["table", "name"],
            OpKind::Alias => &["arg", "name"],
            OpKind::Binary(_) => &["left", "right"],
            OpKind::Unary(_) | OpKind::Extract(_) => &["arg"],
            OpKind::Cast => &["arg", "to"],
            OpKind::IsIn => &["arg", "options"],
            OpKind::Like => &["arg", "pattern"],
            OpKind::SearchedCase => &["conditions", "results", "default"],
            OpKind::Reduction(_) => &["arg", "where"],
            OpKind::CountStar => &["table"],
            OpKind::RowNumber => &[],
            OpKind::Rank => &["arg", "dense"],
            OpKind::Shift(_) => &["arg", "offset"],
            OpKind::WindowFunction => &["func", "group_by", "order_by", "frame", "start", "end"],
            OpKind::SortKey => &["expr", "ascending"],
            OpKind::Bucket => &[
                "arg",
                "edges",
                "closed",
                "close_extreme",
                "include_under",
                "include_over",
            ],
            OpKind::Histogram => &["arg", "nbins", "binwidth", "base", "closed"],
            OpKind::TopK => &["arg", "k", "by"],
            OpKind::SummaryFilter => &["expr"],
            OpKind::Udf => &["func", "args"],
        }
    }
}

/// A single argument value of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Node(NodeRef),
    Nodes(Vec<NodeRef>),
    OptNode(Option<NodeRef>),
    Value(Value),
    Values(Vec<Value>),
    OptValue(Option<Value>),
    Str(String),
    Int(i64),
    OptInt(Option<i64>),
    Bool(bool),
    Type(DataType),
    Schema(Schema),
    Bound(FrameBound),
    Udf(UdfFunction),
}

impl Arg {
    fn variant_name(&self) -> &'static str {
        match self {
            Arg::Node(_) => "node",
            Arg::Nodes(_) => "node list",
            Arg::OptNode(_) => "optional node",
            Arg::Value(_) => "value",
            Arg::Values(_) => "value list",
            Arg::OptValue(_) => "optional value",
            Arg::Str(_) => "string",
            Arg::Int(_) => "integer",
            Arg::OptInt(_) => "optional integer",
            Arg::Bool(_) => "boolean",
            Arg::Type(_) => "type",
            Arg::Schema(_) => "schema",
            Arg::Bound(_) => "frame bound",
            Arg::Udf(_) => "function",
        }
    }

    /// Child nodes held by this argument.
    pub fn nodes(&self) -> &[NodeRef] {
        match self {
            Arg::Node(node) => std::slice::from_ref(node),
            Arg::Nodes(nodes) => nodes,
            Arg::OptNode(Some(node)) => std::slice::from_ref(node),
            _ => &[],
        }
    }
}

/// An immutable IR node.
pub struct Node {
    op: Op,
    output: Output,
    hash: OnceLock<u64>,
}

impl Node {
    /// Validate an operation and wrap it in a shared node.
    pub fn new(op: Op) -> Result<NodeRef, IrError> {
        let output = crate::builder::derive_output(&op)?;
        Ok(Arc::new(Node {
            op,
            output,
            hash: OnceLock::new(),
        }))
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn dtype(&self) -> Option<&DataType> {
        self.output.dtype()
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.output.schema()
    }

    pub fn is_relation(&self) -> bool {
        self.output.is_table()
    }

    pub fn kind(&self) -> OpKind {
        match &self.op {
            Op::UnboundTable { .. } => OpKind::UnboundTable,
            Op::DatabaseTable { .. } => OpKind::DatabaseTable,
            Op::Projection { .. } => OpKind::Projection,
            Op::Filter { .. } => OpKind::Filter,
            Op::Sort { .. } => OpKind::Sort,
            Op::Limit { .. } => OpKind::Limit,
            Op::Aggregation { .. } => OpKind::Aggregation,
            Op::Join { kind, .. } => OpKind::Join(*kind),
            Op::SetOp { kind, .. } => OpKind::SetOp(*kind),
            Op::Literal { .. } => OpKind::Literal,
            Op::TableColumn { .. } => OpKind::TableColumn,
            Op::Alias { .. } => OpKind::Alias,
            Op::Binary { op, .. } => OpKind::Binary(*op),
            Op::Unary { op, .. } => OpKind::Unary(*op),
            Op::Cast { .. } => OpKind::Cast,
            Op::IsIn { .. } => OpKind::IsIn,
            Op::Like { .. } => OpKind::Like,
            Op::Extract { part, .. } => OpKind::Extract(*part),
            Op::SearchedCase { .. } => OpKind::SearchedCase,
            Op::Reduction { func, .. } => OpKind::Reduction(*func),
            Op::CountStar { .. } => OpKind::CountStar,
            Op::RowNumber => OpKind::RowNumber,
            Op::Rank { .. } => OpKind::Rank,
            Op::Shift { kind, .. } => OpKind::Shift(*kind),
            Op::WindowFunction { .. } => OpKind::WindowFunction,
            Op::SortKey { .. } => OpKind::SortKey,
            Op::Bucket { .. } => OpKind::Bucket,
            Op::Histogram { .. } => OpKind::Histogram,
            Op::TopK { .. } => OpKind::TopK,
            Op::SummaryFilter { .. } => OpKind::SummaryFilter,
            Op::Udf { .. } => OpKind::Udf,
        }
    }

    pub fn argnames(&self) -> &'static [&'static str] {
        self.kind().argnames()
    }

    /// Arguments in the same order as [`Node::argnames`].
    pub fn args(&self) -> Vec<Arg> {
        match &self.op {
            Op::UnboundTable { name, schema } => {
                vec![Arg::Str(name.clone()), Arg::Schema(schema.clone())]
            }
            Op::DatabaseTable {
                name,
                schema,
                source,
            } => vec![
                Arg::Str(name.clone()),
                Arg::Schema(schema.clone()),
                Arg::Str(source.clone()),
            ],
            Op::Projection { table, selections } => {
                vec![Arg::Node(table.clone()), Arg::Nodes(selections.clone())]
            }
            Op::Filter { table, predicates } => {
                vec![Arg::Node(table.clone()), Arg::Nodes(predicates.clone())]
            }
            Op::Sort { table, keys } => vec![Arg::Node(table.clone()), Arg::Nodes(keys.clone())],
            Op::Limit { table, n, offset } => vec![
                Arg::Node(table.clone()),
                Arg::Int(*n as i64),
                Arg::Int(*offset as i64),
            ],
            Op::Aggregation { table, metrics, by } => vec![
                Arg::Node(table.clone()),
                Arg::Nodes(metrics.clone()),
                Arg::Nodes(by.clone()),
            ],
            Op::Join {
                left,
                right,
                predicates,
                ..
            } => vec![
                Arg::Node(left.clone()),
                Arg::Node(right.clone()),
                Arg::Nodes(predicates.clone()),
            ],
            Op::SetOp {
                left,
                right,
                distinct,
                ..
            } => vec![
                Arg::Node(left.clone()),
                Arg::Node(right.clone()),
                Arg::Bool(*distinct),
            ],
            Op::Literal { value, dtype } => {
                vec![Arg::Value(value.clone()), Arg::Type(dtype.clone())]
            }
            Op::TableColumn { table, name } => {
                vec![Arg::Node(table.clone()), Arg::Str(name.clone())]
            }
            Op::Alias { arg, name } => vec![Arg::Node(arg.clone()), Arg::Str(name.clone())],
            Op::Binary { left, right, .. } => {
                vec![Arg::Node(left.clone()), Arg::Node(right.clone())]
            }
            Op::Unary { arg, .. } | Op::Extract { arg, .. } => vec![Arg::Node(arg.clone())],
            Op::Cast { arg, to } => vec![Arg::Node(arg.clone()), Arg::Type(to.clone())],
            Op::IsIn { arg, options } => {
                vec![Arg::Node(arg.clone()), Arg::Nodes(options.clone())]
            }
            Op::Like { arg, pattern } => {
                vec![Arg::Node(arg.clone()), Arg::Str(pattern.clone())]
            }
            Op::SearchedCase {
                conditions,
                results,
                default,
            } => vec![
                Arg::Nodes(conditions.clone()),
                Arg::Nodes(results.clone()),
                Arg::Node(default.clone()),
            ],
            Op::Reduction { arg, filter, .. } => {
                vec![Arg::Node(arg.clone()), Arg::OptNode(filter.clone())]
            }
            Op::CountStar { table } => vec![Arg::Node(table.clone())],
            Op::RowNumber => vec![],
            Op::Rank { arg, dense } => vec![Arg::Node(arg.clone()), Arg::Bool(*dense)],
            Op::Shift { arg, offset, .. } => vec![Arg::Node(arg.clone()), Arg::Int(*offset)],
            Op::WindowFunction {
                func,
                group_by,
                order_by,
                frame,
                start,
                end,
            } => vec![
                Arg::Node(func.clone()),
                Arg::Nodes(group_by.clone()),
                Arg::Nodes(order_by.clone()),
                Arg::Str(frame.as_str().to_string()),
                Arg::Bound(start.clone()),
                Arg::Bound(end.clone()),
            ],
            Op::SortKey { expr, ascending } => {
                vec![Arg::Node(expr.clone()), Arg::Bool(*ascending)]
            }
            Op::Bucket {
                arg,
                edges,
                closed,
                close_extreme,
                include_under,
                include_over,
            } => vec![
                Arg::Node(arg.clone()),
                Arg::Values(edges.clone()),
                Arg::Str(closed.as_str().to_string()),
                Arg::Bool(*close_extreme),
                Arg::Bool(*include_under),
                Arg::Bool(*include_over),
            ],
            Op::Histogram {
                arg,
                nbins,
                binwidth,
                base,
                closed,
            } => vec![
                Arg::Node(arg.clone()),
                Arg::OptInt(nbins.map(|n| n as i64)),
                Arg::OptValue(binwidth.clone()),
                Arg::OptValue(base.clone()),
                Arg::Str(closed.as_str().to_string()),
            ],
            Op::TopK { arg, k, by } => vec![
                Arg::Node(arg.clone()),
                Arg::Int(*k as i64),
                Arg::Node(by.clone()),
            ],
            Op::SummaryFilter { expr } => vec![Arg::Node(expr.clone())],
            Op::Udf { func, args } => vec![Arg::Udf(func.clone()), Arg::Nodes(args.clone())],
        }
    }

    /// Rebuild a node from its kind and positional arguments. The result is
    /// validated exactly like a freshly built node.
    pub fn from_args(kind: OpKind, args: Vec<Arg>) -> Result<NodeRef, IrError> {
        let mut r = ArgReader::new(kind, args);
        let op = match kind {
            OpKind::UnboundTable => Op::UnboundTable {
                name: r.string()?,
                schema: r.schema()?,
            },
            OpKind::DatabaseTable => Op::DatabaseTable {
                name: r.string()?,
                schema: r.schema()?,
                source: r.string()?,
            },
            OpKind::Projection => Op::Projection {
                table: r.node()?,
                selections: r.nodes()?,
            },
            OpKind::Filter => Op::Filter {
                table: r.node()?,
                predicates: r.nodes()?,
            },
            OpKind::Sort => Op::Sort {
                table: r.node()?,
                keys: r.nodes()?,
            },
            OpKind::Limit => Op::Limit {
                table: r.node()?,
                n: r.count()?,
                offset: r.count()?,
            },
            OpKind::Aggregation => Op::Aggregation {
                table: r.node()?,
                metrics: r.nodes()?,
                by: r.nodes()?,
            },
            OpKind::Join(kind) => Op::Join {
                kind,
                left: r.node()?,
                right: r.node()?,
                predicates: r.nodes()?,
            },
            OpKind::SetOp(kind) => Op::SetOp {
                kind,
                left: r.node()?,
                right: r.node()?,
                distinct: r.boolean()?,
            },
            OpKind::Literal => Op::Literal {
                value: r.value()?,
                dtype: r.dtype()?,
            },
            OpKind::TableColumn => Op::TableColumn {
                table: r.node()?,
                name: r.string()?,
            },
            OpKind::Alias => Op::Alias {
                arg: r.node()?,
                name: r.string()?,
            },
            OpKind::Binary(op) => Op::Binary {
                op,
                left: r.node()?,
                right: r.node()?,
            },
            OpKind::Unary(op) => Op::Unary { op, arg: r.node()? },
            OpKind::Cast => Op::Cast {
                arg: r.node()?,
                to: r.dtype()?,
            },
            OpKind::IsIn => Op::IsIn {
                arg: r.node()?,
                options: r.nodes()?,
            },
            OpKind::Like => Op::Like {
                arg: r.node()?,
                pattern: r.string()?,
            },
            OpKind::Extract(part) => Op::Extract {
                part,
                arg: r.node()?,
            },
            OpKind::SearchedCase => Op::SearchedCase {
                conditions: r.nodes()?,
                results: r.nodes()?,
                default: r.node()?,
            },
            OpKind::Reduction(func) => Op::Reduction {
                func,
                arg: r.node()?,
                filter: r.opt_node()?,
            },
            OpKind::CountStar => Op::CountStar { table: r.node()? },
            OpKind::RowNumber => Op::RowNumber,
            OpKind::Rank => Op::Rank {
                arg: r.node()?,
                dense: r.boolean()?,
            },
            OpKind::Shift(kind) => Op::Shift {
                kind,
                arg: r.node()?,
                offset: r.int()?,
            },
            OpKind::WindowFunction => Op::WindowFunction {
                func: r.node()?,
                group_by: r.nodes()?,
                order_by: r.nodes()?,
                frame: r.string()?.parse()?,
                start: r.bound()?,
                end: r.bound()?,
            },
            OpKind::SortKey => Op::SortKey {
                expr: r.node()?,
                ascending: r.boolean()?,
            },
            OpKind::Bucket => Op::Bucket {
                arg: r.node()?,
                edges: r.values()?,
                closed: r.string()?.parse()?,
                close_extreme: r.boolean()?,
                include_under: r.boolean()?,
                include_over: r.boolean()?,
            },
            OpKind::Histogram => Op::Histogram {
                arg: r.node()?,
                nbins: r.opt_count()?,
                binwidth: r.opt_value()?,
                base: r.opt_value()?,
                closed: r.string()?.parse()?,
            },
            OpKind::TopK => Op::TopK {
                arg: r.node()?,
                k: r.count()?,
                by: r.node()?,
            },
            OpKind::SummaryFilter => Op::SummaryFilter { expr: r.node()? },
            OpKind::Udf => Op::Udf {
                func: r.udf()?,
                args: r.nodes()?,
            },
        };
        r.finish()?;
        Node::new(op)
    }

    /// Child nodes in argument order.
    pub fn children(&self) -> Vec<NodeRef> {
        self.args()
            .iter()
            .flat_map(|arg| arg.nodes().to_vec())
            .collect()
    }

    /// Hash of the node's kind and arguments, computed once.
    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.kind().hash(&mut hasher);
            for arg in self.args() {
                arg.hash(&mut hasher);
            }
            hasher.finish()
        })
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let mut seen = HashSet::new();
        nodes_equal(self, other, &mut seen)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Pairs already proven equal during one comparison.
type Seen = HashSet<(usize, usize)>;

fn nodes_equal(a: &Node, b: &Node, seen: &mut Seen) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    if a.structural_hash() != b.structural_hash() || a.kind() != b.kind() {
        return false;
    }
    let key = (a as *const Node as usize, b as *const Node as usize);
    if seen.contains(&key) {
        return true;
    }
    let equal = args_equal(&a.args(), &b.args(), seen);
    if equal {
        seen.insert(key);
    }
    equal
}

fn args_equal(left: &[Arg], right: &[Arg], seen: &mut Seen) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(a, b)| match (a, b) {
            (Arg::Node(_), Arg::Node(_))
            | (Arg::Nodes(_), Arg::Nodes(_))
            | (Arg::OptNode(_), Arg::OptNode(_)) => {
                let (xs, ys) = (a.nodes(), b.nodes());
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| nodes_equal(x, y, seen))
            }
            _ => a == b,
        })
}

/// Positional reader used by [`Node::from_args`].
struct ArgReader {
    kind: OpKind,
    args: std::vec::IntoIter<Arg>,
    pos: usize,
}

impl ArgReader {
    fn new(kind: OpKind, args: Vec<Arg>) -> Self {
        Self {
            kind,
            args: args.into_iter(),
            pos: 0,
        }
    }

    fn arg_name(&self) -> String {
        self.kind
            .argnames()
            .get(self.pos)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("#{}", self.pos))
    }

    fn mismatch(&self, expected: &str, found: &str) -> IrError {
        IrError::TypeMismatch {
            op: self.kind.name(),
            arg: self.arg_name(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    fn take<T>(
        &mut self,
        expected: &str,
        pick: impl FnOnce(Arg) -> Result<T, Arg>,
    ) -> Result<T, IrError> {
        let arg = self
            .args
            .next()
            .ok_or_else(|| self.mismatch(expected, "nothing"))?;
        let picked = pick(arg).map_err(|arg| self.mismatch(expected, arg.variant_name()))?;
        self.pos += 1;
        Ok(picked)
    }

    /// Check a just-read integer, reporting against the argument it came from.
    fn non_negative(&self, n: i64) -> Result<u64, IrError> {
        u64::try_from(n).map_err(|_| {
            let mut err = self.mismatch("non-negative integer", &n.to_string());
            if let (IrError::TypeMismatch { arg, .. }, Some(name)) =
                (&mut err, self.kind.argnames().get(self.pos.wrapping_sub(1)))
            {
                *arg = name.to_string();
            }
            err
        })
    }

    fn node(&mut self) -> Result<NodeRef, IrError> {
        self.take("node", |a| match a {
            Arg::Node(n) => Ok(n),
            other => Err(other),
        })
    }

    fn nodes(&mut self) -> Result<Vec<NodeRef>, IrError> {
        self.take("node list", |a| match a {
            Arg::Nodes(n) => Ok(n),
            other => Err(other),
        })
    }

    fn opt_node(&mut self) -> Result<Option<NodeRef>, IrError> {
        self.take("optional node", |a| match a {
            Arg::OptNode(n) => Ok(n),
            other => Err(other),
        })
    }

    fn value(&mut self) -> Result<Value, IrError> {
        self.take("value", |a| match a {
            Arg::Value(v) => Ok(v),
            other => Err(other),
        })
    }

    fn values(&mut self) -> Result<Vec<Value>, IrError> {
        self.take("value list", |a| match a {
            Arg::Values(v) => Ok(v),
            other => Err(other),
        })
    }

    fn opt_value(&mut self) -> Result<Option<Value>, IrError> {
        self.take("optional value", |a| match a {
            Arg::OptValue(v) => Ok(v),
            other => Err(other),
        })
    }

    fn string(&mut self) -> Result<String, IrError> {
        self.take("string", |a| match a {
            Arg::Str(s) => Ok(s),
            other => Err(other),
        })
    }

    fn int(&mut self) -> Result<i64, IrError> {
        self.take("integer", |a| match a {
            Arg::Int(n) => Ok(n),
            other => Err(other),
        })
    }

    fn count(&mut self) -> Result<u64, IrError> {
        let n = self.int()?;
        self.non_negative(n)
    }

    fn opt_count(&mut self) -> Result<Option<u64>, IrError> {
        let n = self.take("optional integer", |a| match a {
            Arg::OptInt(n) => Ok(n),
            other => Err(other),
        })?;
        n.map(|n| self.non_negative(n)).transpose()
    }

    fn boolean(&mut self) -> Result<bool, IrError> {
        self.take("boolean", |a| match a {
            Arg::Bool(b) => Ok(b),
            other => Err(other),
        })
    }

    fn dtype(&mut self) -> Result<DataType, IrError> {
        self.take("type", |a| match a {
            Arg::Type(t) => Ok(t),
            other => Err(other),
        })
    }

    fn schema(&mut self) -> Result<Schema, IrError> {
        self.take("schema", |a| match a {
            Arg::Schema(s) => Ok(s),
            other => Err(other),
        })
    }

    fn bound(&mut self) -> Result<FrameBound, IrError> {
        self.take("frame bound", |a| match a {
            Arg::Bound(b) => Ok(b),
            other => Err(other),
        })
    }

    fn udf(&mut self) -> Result<UdfFunction, IrError> {
        self.take("function", |a| match a {
            Arg::Udf(f) => Ok(f),
            other => Err(other),
        })
    }

    fn finish(mut self) -> Result<(), IrError> {
        match self.args.next() {
            None => Ok(()),
            Some(extra) => Err(self.mismatch("no further arguments", extra.variant_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Schema;

    fn table() -> NodeRef {
        let schema = Schema::from_pairs(&[("a", "int64"), ("b", "string")]).unwrap();
        Node::new(Op::UnboundTable {
            name: "t".to_string(),
            schema,
        })
        .unwrap()
    }

    fn column(table: &NodeRef, name: &str) -> NodeRef {
        Node::new(Op::TableColumn {
            table: table.clone(),
            name: name.to_string(),
        })
        .unwrap()
    }

    fn rebuild(node: &NodeRef) -> NodeRef {
        Node::from_args(node.kind(), node.args()).unwrap()
    }

    #[test]
    fn test_argnames_match_args() {
        let t = table();
        let a = column(&t, "a");
        let sum = Node::new(Op::Reduction {
            func: ReductionFunc::Sum,
            arg: a.clone(),
            filter: None,
        })
        .unwrap();
        for node in [&t, &a, &sum] {
            assert_eq!(node.argnames().len(), node.args().len());
        }
        assert_eq!(sum.argnames(), &["arg", "where"]);
    }

    #[test]
    fn test_from_args_reconstructs_equal_node() {
        let t = table();
        let pred = Node::new(Op::Binary {
            op: BinaryOp::Gt,
            left: column(&t, "a"),
            right: Node::new(Op::Literal {
                value: Value::Int(1),
                dtype: DataType::int8(),
            })
            .unwrap(),
        })
        .unwrap();
        let filtered = Node::new(Op::Filter {
            table: t.clone(),
            predicates: vec![pred.clone()],
        })
        .unwrap();
        for node in [&t, &pred, &filtered] {
            let copy = rebuild(node);
            assert!(!Arc::ptr_eq(node, &copy));
            assert_eq!(*node, copy);
            assert_eq!(node.structural_hash(), copy.structural_hash());
        }
    }

    #[test]
    fn test_from_args_rejects_wrong_arguments() {
        let err = Node::from_args(OpKind::TableColumn, vec![Arg::Str("t".into())]).unwrap_err();
        assert!(matches!(
            err,
            IrError::TypeMismatch { ref arg, ref expected, .. } if arg == "table" && expected == "node"
        ));

        let t = table();
        let err = Node::from_args(
            OpKind::TableColumn,
            vec![Arg::Node(t), Arg::Str("a".into()), Arg::Bool(true)],
        )
        .unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn test_from_args_revalidates() {
        let t = table();
        let err = Node::from_args(
            OpKind::TableColumn,
            vec![Arg::Node(t), Arg::Str("missing".into())],
        )
        .unwrap_err();
        assert!(matches!(err, IrError::ColumnNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_independent_graphs_are_equal() {
        let left = column(&table(), "a");
        let right = column(&table(), "a");
        assert!(!Arc::ptr_eq(&left, &right));
        assert_eq!(left, right);
        assert_ne!(left, column(&table(), "b"));
    }

    #[test]
    fn test_kind_includes_operator() {
        let t = table();
        let add = Node::new(Op::Binary {
            op: BinaryOp::Add,
            left: column(&t, "a"),
            right: column(&t, "a"),
        })
        .unwrap();
        let sub = Node::new(Op::Binary {
            op: BinaryOp::Sub,
            left: column(&t, "a"),
            right: column(&t, "a"),
        })
        .unwrap();
        assert_eq!(add.kind(), OpKind::Binary(BinaryOp::Add));
        assert_eq!(add.kind().name(), "Add");
        assert_ne!(add, sub);
    }

    #[test]
    fn test_deep_shared_dag_equality_is_linear() {
        fn self_union(depth: usize) -> NodeRef {
            let mut node = table();
            for _ in 0..depth {
                node = Node::new(Op::SetOp {
                    kind: SetOpKind::Union,
                    left: node.clone(),
                    right: node,
                    distinct: false,
                })
                .unwrap();
            }
            node
        }
        // 2^40 paths; only finishes if hashing and comparison are memoized.
        let a = self_union(40);
        let b = self_union(40);
        assert_eq!(a, b);
    }
}
