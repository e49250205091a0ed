//! Text rendering of IR graphs.
//!
//! Each distinct relation is printed once as a numbered block
//! (`r0 := UnboundTable: t`), and later references use its number. Value
//! expressions render inline. Rendered strings are memoized per node for a
//! single render, so shared sub-graphs are formatted once no matter how many
//! parents refer to them.

use std::collections::HashMap;
use std::fmt;

use crate::config::{options, ReprOptions};
use crate::ir::Op;
use crate::node::{Arg, Node, NodeRef};

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self, &options().repr))
    }
}

/// Render a graph with explicit options.
pub fn render(node: &Node, options: &ReprOptions) -> String {
    let mut printer = Printer::new(options.clone());
    let root = printer.root(node);
    let mut out = String::new();
    for block in &printer.blocks {
        out.push_str(block);
        out.push_str("\n\n");
    }
    out.push_str(&root);
    out
}

struct Printer {
    options: ReprOptions,
    /// Relation node -> its `rN` label.
    labels: HashMap<NodeRef, String>,
    /// Value node -> its inline text.
    values: HashMap<NodeRef, String>,
    blocks: Vec<String>,
}

impl Printer {
    fn new(options: ReprOptions) -> Self {
        Self {
            options,
            labels: HashMap::new(),
            values: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    /// Render the root node; a relation root is printed as its block.
    fn root(&mut self, node: &Node) -> String {
        if node.is_relation() {
            let body = self.block(node);
            format!("r{} := {}", self.labels.len(), body)
        } else {
            self.value_text(node)
        }
    }

    fn relation(&mut self, node: &NodeRef) -> String {
        if let Some(label) = self.labels.get(node) {
            return label.clone();
        }
        let body = self.block(node);
        let label = format!("r{}", self.labels.len());
        self.blocks.push(format!("{} := {}", label, body));
        self.labels.insert(node.clone(), label.clone());
        label
    }

    fn value(&mut self, node: &NodeRef) -> String {
        if let Some(text) = self.values.get(node) {
            return text.clone();
        }
        let text = self.value_text(node);
        self.values.insert(node.clone(), text.clone());
        text
    }

    fn values(&mut self, nodes: &[NodeRef]) -> Vec<String> {
        nodes.iter().map(|n| self.value(n)).collect()
    }

    /// Block text after the `rN := ` prefix. Parents are labelled first.
    fn block(&mut self, node: &Node) -> String {
        match node.op() {
            Op::UnboundTable { name, .. } | Op::DatabaseTable { name, .. } => {
                let mut out = format!("{}: {}", node.kind().name(), name);
                self.push_schema(&mut out, node);
                out
            }
            Op::Projection { table, selections } => {
                let parent = self.relation(table);
                let mut out = format!("Project[{}]", parent);
                for sel in selections {
                    let text = self.value(sel);
                    let name = sel.name().unwrap_or_default();
                    out.push_str(&format!("\n  {}: {}", name, text));
                }
                out
            }
            Op::Filter { table, predicates } => {
                let parent = self.relation(table);
                let mut out = format!("Filter[{}]", parent);
                for text in self.values(predicates) {
                    out.push_str(&format!("\n  {}", text));
                }
                out
            }
            Op::Sort { table, keys } => {
                let parent = self.relation(table);
                let mut out = format!("Sort[{}]", parent);
                for text in self.values(keys) {
                    out.push_str(&format!("\n  {}", text));
                }
                out
            }
            Op::Limit { table, n, offset } => {
                let parent = self.relation(table);
                if *offset == 0 {
                    format!("Limit[{}, n={}]", parent, n)
                } else {
                    format!("Limit[{}, n={}, offset={}]", parent, n, offset)
                }
            }
            Op::Aggregation { table, metrics, by } => {
                let parent = self.relation(table);
                let mut out = format!("Aggregate[{}]", parent);
                for (title, nodes) in [("groups", by), ("metrics", metrics)] {
                    if nodes.is_empty() {
                        continue;
                    }
                    out.push_str(&format!("\n  {}:", title));
                    for n in nodes {
                        let text = self.value(n);
                        let name = n.name().unwrap_or_default();
                        out.push_str(&format!("\n    {}: {}", name, text));
                    }
                }
                out
            }
            Op::Join {
                left,
                right,
                predicates,
                ..
            } => {
                let l = self.relation(left);
                let r = self.relation(right);
                let mut out = format!("{}[{}, {}]", node.kind().name(), l, r);
                for text in self.values(predicates) {
                    out.push_str(&format!("\n  {}", text));
                }
                out
            }
            Op::SetOp {
                left,
                right,
                distinct,
                ..
            } => {
                let l = self.relation(left);
                let r = self.relation(right);
                format!(
                    "{}[{}, {}, distinct={}]",
                    node.kind().name(),
                    l,
                    r,
                    py_bool(*distinct)
                )
            }
            _ => self.value_text(node),
        }
    }

    fn push_schema(&self, out: &mut String, node: &Node) {
        let Some(schema) = node.schema() else {
            return;
        };
        let width = schema.names().map(str::len).max().unwrap_or(0);
        for (name, ty) in schema.iter().take(self.options.max_columns) {
            if self.options.show_types {
                out.push_str(&format!("\n  {:<width$} {}", name, ty, width = width));
            } else {
                out.push_str(&format!("\n  {}", name));
            }
        }
        if schema.len() > self.options.max_columns {
            out.push_str(&format!(
                "\n  ... {} more",
                schema.len() - self.options.max_columns
            ));
        }
    }

    fn value_text(&mut self, node: &Node) -> String {
        match node.op() {
            Op::Literal { value, .. } => value.to_string(),
            Op::TableColumn { table, name } => {
                let parent = self.relation(table);
                format!("{}.{}", parent, name)
            }
            Op::Binary { op, left, right } => {
                let l = self.operand(left);
                let r = self.operand(right);
                format!("{} {} {}", l, op.symbol(), r)
            }
            Op::SortKey { expr, ascending } => {
                let inner = self.value(expr);
                format!("{} {}", if *ascending { "asc" } else { "desc" }, inner)
            }
            Op::CountStar { table } => {
                let parent = self.relation(table);
                format!("CountStar({})", parent)
            }
            _ => self.call(node),
        }
    }

    /// Binary operands are parenthesized when they are binary themselves.
    fn operand(&mut self, node: &NodeRef) -> String {
        let text = self.value(node);
        if matches!(node.op(), Op::Binary { .. }) {
            format!("({})", text)
        } else {
            text
        }
    }

    /// `Name(positional, key=value)` form used by most value operations.
    fn call(&mut self, node: &Node) -> String {
        let mut parts = Vec::new();
        for (name, arg) in node.argnames().iter().zip(node.args()) {
            match arg {
                Arg::Node(n) => parts.push(self.value(&n)),
                Arg::Nodes(ns) => {
                    let texts = self.values(&ns);
                    parts.push(format!("{}=[{}]", name, texts.join(", ")));
                }
                Arg::OptNode(Some(n)) => {
                    let text = self.value(&n);
                    parts.push(format!("{}={}", name, text));
                }
                Arg::OptNode(None) | Arg::OptValue(None) | Arg::OptInt(None) => {}
                Arg::Value(v) | Arg::OptValue(Some(v)) => parts.push(format!("{}={}", name, v)),
                Arg::Values(vs) => {
                    let texts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                    parts.push(format!("{}=[{}]", name, texts.join(", ")));
                }
                Arg::Str(s) => parts.push(format!("{}={}", name, s)),
                Arg::Int(n) | Arg::OptInt(Some(n)) => parts.push(format!("{}={}", name, n)),
                Arg::Bool(b) => parts.push(format!("{}={}", name, py_bool(b))),
                Arg::Type(t) => parts.push(format!("{}={}", name, t)),
                Arg::Schema(s) => parts.push(format!("{}={}", name, s.len())),
                Arg::Bound(b) => parts.push(format!("{}={}", name, b)),
                Arg::Udf(f) => parts.push(format!("{}={}", name, f.name())),
            }
        }
        format!("{}({})", node.kind().name(), parts.join(", "))
    }
}

fn py_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::config::ReprOptions;
    use crate::expr::Table;

    fn table() -> Table {
        Table::unbound("t", &[("a", "int64"), ("bb", "!string")]).unwrap()
    }

    #[test]
    fn test_table_block() {
        let text = table().to_string();
        assert_eq!(text, "r0 := UnboundTable: t\n  a  int64\n  bb !string");
    }

    #[test]
    fn test_relations_are_numbered_once() {
        let t = table();
        let a = t.col("a").unwrap();
        let filtered = t.filter([a.gt(1).unwrap(), a.lt(10).unwrap()]).unwrap();
        let text = filtered.to_string();
        assert_eq!(text.matches("r0 := UnboundTable").count(), 1);
        assert!(text.contains("r1 := Filter[r0]\n  r0.a > 1\n  r0.a < 10"));
    }

    #[test]
    fn test_value_root() {
        let t = table();
        let expr = t.col("a").unwrap().sum().unwrap();
        let text = expr.to_string();
        assert!(text.starts_with("r0 := UnboundTable: t"));
        assert!(text.ends_with("Sum(r0.a)"));
    }

    #[test]
    fn test_wide_union_repr_formats_each_table_once() {
        // Tables share half of their columns with their neighbour.
        let tables: Vec<Table> = (0..60)
            .map(|i| {
                let names: Vec<String> = (0..40).map(|c| format!("c{}", c)).collect();
                let pairs: Vec<(&str, &str)> =
                    names.iter().map(|n| (n.as_str(), "float64")).collect();
                Table::unbound(format!("t{}", i / 2), &pairs).unwrap()
            })
            .collect();
        let mut union = tables[0].clone();
        for t in &tables[1..] {
            union = union.union(t, false).unwrap().union(&union, false).unwrap();
        }
        let text = union.to_string();
        // 30 distinct leaves and two unions per step.
        assert_eq!(text.matches(":= UnboundTable").count(), 30);
        assert_eq!(text.matches(":= Union").count(), 2 * 59);
    }

    #[test]
    fn test_repr_options() {
        let t = Table::unbound("w", &[("a", "int64"), ("b", "int64"), ("c", "int64")]).unwrap();
        let opts = ReprOptions {
            max_columns: 2,
            show_types: false,
        };
        assert_eq!(
            render(t.node(), &opts),
            "r0 := UnboundTable: w\n  a\n  b\n  ... 1 more"
        );
    }
}
