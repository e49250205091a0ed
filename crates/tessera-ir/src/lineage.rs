//! Table lineage: which relation a column belongs to, and moving columns
//! from a parent relation onto a relation derived from it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::IrError;
use crate::ir::Op;
use crate::node::{Arg, Node, NodeRef, Output};

/// How far a walk over a value expression reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// Follow column-shaped nodes only; scalars are independent subqueries.
    Columns,
    /// Follow every value node, as inside aggregation metrics.
    Values,
}

/// Whether `ancestor` is `table` itself or a relation whose columns are
/// still addressable through `table`.
pub fn derives_from(table: &NodeRef, ancestor: &NodeRef) -> bool {
    let mut stack = vec![table.clone()];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == *ancestor {
            return true;
        }
        if !visited.insert(ptr(&current)) {
            continue;
        }
        match current.op() {
            Op::Projection { table, .. }
            | Op::Filter { table, .. }
            | Op::Sort { table, .. }
            | Op::Limit { table, .. } => stack.push(table.clone()),
            Op::Join {
                kind, left, right, ..
            } => {
                stack.push(left.clone());
                if !kind.is_filtering() {
                    stack.push(right.clone());
                }
            }
            _ => {}
        }
    }
    false
}

/// Relations referenced by the columns of a value expression, in order of
/// first appearance.
pub fn column_tables(node: &NodeRef) -> Vec<NodeRef> {
    let mut found: Vec<NodeRef> = Vec::new();
    let mut visited = HashSet::new();
    collect_tables(node, Reach::Columns, true, &mut visited, &mut found);
    found
}

fn collect_tables(
    node: &NodeRef,
    reach: Reach,
    force: bool,
    visited: &mut HashSet<(usize, bool)>,
    found: &mut Vec<NodeRef>,
) {
    if !visited.insert((ptr(node), force)) {
        return;
    }
    match node.op() {
        Op::TableColumn { table, .. } => {
            if !found.contains(table) {
                found.push(table.clone());
            }
        }
        _ if !follows(node, reach, force) => {}
        Op::WindowFunction { func, .. } => {
            collect_tables(func, reach, true, visited, found);
            for child in node.children().iter().skip(1) {
                collect_tables(child, reach, false, visited, found);
            }
        }
        _ => {
            for child in node.children() {
                collect_tables(&child, reach, false, visited, found);
            }
        }
    }
}

/// First column of `node` that belongs to none of `tables`.
pub(crate) fn foreign_column(node: &NodeRef, tables: &[&NodeRef], reach: Reach) -> Option<String> {
    column_refs(node, reach)
        .into_iter()
        .find(|(table, _)| !tables.iter().any(|t| *t == table))
        .map(|(_, name)| name)
}

fn column_refs(node: &NodeRef, reach: Reach) -> Vec<(NodeRef, String)> {
    fn walk(
        node: &NodeRef,
        reach: Reach,
        force: bool,
        visited: &mut HashSet<(usize, bool)>,
        out: &mut Vec<(NodeRef, String)>,
    ) {
        if !visited.insert((ptr(node), force)) {
            return;
        }
        match node.op() {
            Op::TableColumn { table, name } => out.push((table.clone(), name.clone())),
            _ if !follows(node, reach, force) => {}
            Op::WindowFunction { func, .. } => {
                walk(func, reach, true, visited, out);
                for child in node.children().iter().skip(1) {
                    walk(child, reach, false, visited, out);
                }
            }
            _ => {
                for child in node.children() {
                    walk(&child, reach, false, visited, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(node, reach, true, &mut HashSet::new(), &mut out);
    out
}

/// Rewrite the columns of `node` so they belong to one of `targets`.
///
/// A column already on a target is kept. A column on a relation that a
/// target derives from is moved onto that target when the target still has
/// a column of that name. Anything else is a relation error.
pub fn rebase(node: &NodeRef, targets: &[&NodeRef], reach: Reach) -> Result<NodeRef, IrError> {
    let mut memo = HashMap::new();
    rebase_inner(node, targets, reach, true, &mut memo)
}

fn rebase_inner(
    node: &NodeRef,
    targets: &[&NodeRef],
    reach: Reach,
    force: bool,
    memo: &mut HashMap<(usize, bool), NodeRef>,
) -> Result<NodeRef, IrError> {
    if let Some(done) = memo.get(&(ptr(node), force)) {
        return Ok(done.clone());
    }
    let result = match node.op() {
        Op::TableColumn { table, name } => {
            if targets.iter().any(|t| *t == table) {
                node.clone()
            } else {
                let target = targets
                    .iter()
                    .find(|t| {
                        t.schema().is_some_and(|s| s.contains(name)) && derives_from(t, table)
                    })
                    .ok_or_else(|| {
                        IrError::relation(format!(
                            "column '{}' does not belong to the table it is used with",
                            name
                        ))
                    })?;
                Node::new(Op::TableColumn {
                    table: (*target).clone(),
                    name: name.clone(),
                })?
            }
        }
        _ if !follows(node, reach, force) => node.clone(),
        _ => {
            let is_window = matches!(node.op(), Op::WindowFunction { .. });
            let mut changed = false;
            let mut args = node.args();
            let mut first = true;
            for arg in args.iter_mut() {
                let rewritten = match arg {
                    Arg::Node(child) => {
                        let force_child = is_window && first;
                        first = false;
                        let new = rebase_inner(child, targets, reach, force_child, memo)?;
                        changed |= !Arc::ptr_eq(&new, child);
                        Some(Arg::Node(new))
                    }
                    Arg::Nodes(children) => {
                        let mut out = Vec::with_capacity(children.len());
                        for child in children.iter() {
                            let new = rebase_inner(child, targets, reach, false, memo)?;
                            changed |= !Arc::ptr_eq(&new, child);
                            out.push(new);
                        }
                        Some(Arg::Nodes(out))
                    }
                    Arg::OptNode(Some(child)) => {
                        let new = rebase_inner(child, targets, reach, false, memo)?;
                        changed |= !Arc::ptr_eq(&new, child);
                        Some(Arg::OptNode(Some(new)))
                    }
                    _ => None,
                };
                if let Some(rewritten) = rewritten {
                    *arg = rewritten;
                }
            }
            if changed {
                Node::from_args(node.kind(), args)?
            } else {
                node.clone()
            }
        }
    };
    memo.insert((ptr(node), force), result.clone());
    Ok(result)
}

/// Whether a walk continues below `node`.
fn follows(node: &Node, reach: Reach, force: bool) -> bool {
    match node.output() {
        Output::Table(_) => false,
        Output::Scalar(_) => force || reach == Reach::Values,
        Output::Column(_) => true,
    }
}

fn ptr(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}
