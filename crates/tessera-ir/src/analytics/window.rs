//! Window specifications.
//!
//! A [`Window`] is plain data. Keys given by name stay unresolved until the
//! window is applied with [`Expr::over`], where they are looked up on the
//! table the computation reads from. The window never holds that table.

use tessera_types::Value;

use crate::error::IrError;
use crate::expr::{Expr, Table};
use crate::ir::{FrameBound, FrameKind, Op};
use crate::lineage::column_tables;
use crate::node::Node;

/// A partition or ordering key.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowKey {
    Name(String),
    Expr(Expr),
}

impl From<&str> for WindowKey {
    fn from(name: &str) -> Self {
        WindowKey::Name(name.to_string())
    }
}

impl From<String> for WindowKey {
    fn from(name: String) -> Self {
        WindowKey::Name(name)
    }
}

impl From<Expr> for WindowKey {
    fn from(expr: Expr) -> Self {
        WindowKey::Expr(expr)
    }
}

impl From<&Expr> for WindowKey {
    fn from(expr: &Expr) -> Self {
        WindowKey::Expr(expr.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    group_by: Vec<WindowKey>,
    order_by: Vec<WindowKey>,
    frame: FrameKind,
    start: FrameBound,
    end: FrameBound,
}

impl Window {
    /// Whole-partition window with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<WindowKey>,
    {
        self.group_by.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn order_by<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<WindowKey>,
    {
        self.order_by.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Row frame. `None` is unbounded, zero is the current row.
    pub fn rows(mut self, preceding: Option<u64>, following: Option<u64>) -> Self {
        self.frame = FrameKind::Rows;
        self.start = match preceding {
            None => FrameBound::Unbounded,
            Some(0) => FrameBound::CurrentRow,
            Some(n) => FrameBound::Preceding(Value::Int(n as i64)),
        };
        self.end = match following {
            None => FrameBound::Unbounded,
            Some(0) => FrameBound::CurrentRow,
            Some(n) => FrameBound::Following(Value::Int(n as i64)),
        };
        self
    }

    /// Range frame between two bounds on the single order key.
    pub fn range(mut self, start: FrameBound, end: FrameBound) -> Self {
        self.frame = FrameKind::Range;
        self.start = start;
        self.end = end;
        self
    }

    pub fn frame(&self) -> FrameKind {
        self.frame
    }

    pub fn start(&self) -> &FrameBound {
        &self.start
    }

    pub fn end(&self) -> &FrameBound {
        &self.end
    }
}

/// The current row and the `rows` rows before it.
pub fn trailing_window(rows: u64) -> Window {
    Window::new().rows(Some(rows), Some(0))
}

/// Rows whose order key lies within `interval` before the current one.
pub fn trailing_range_window(interval: impl Into<Value>) -> Window {
    Window::new().range(FrameBound::Preceding(interval.into()), FrameBound::CurrentRow)
}

/// Everything from the partition start through the current row.
pub fn cumulative_window() -> Window {
    Window::new().rows(None, Some(0))
}

impl Expr {
    /// Compute this expression over a window.
    ///
    /// An aliased expression keeps its alias on the windowed result.
    pub fn over(&self, window: &Window) -> Result<Expr, IrError> {
        if let Op::Alias { arg, name } = self.node().op() {
            return Expr::from_node(arg.clone()).over(window)?.alias(name.clone());
        }
        let owner = column_tables(self.node()).into_iter().next().map(Table::from_node);
        let resolve = |key: &WindowKey| -> Result<Expr, IrError> {
            match key {
                WindowKey::Expr(expr) => Ok(expr.clone()),
                WindowKey::Name(name) => match &owner {
                    Some(table) => table.col(name),
                    None => Err(IrError::relation(format!(
                        "window key '{}' needs a table to resolve against",
                        name
                    ))),
                },
            }
        };
        let group_by = window
            .group_by
            .iter()
            .map(|k| resolve(k).map(Expr::into_node))
            .collect::<Result<Vec<_>, _>>()?;
        let order_by = window
            .order_by
            .iter()
            .map(|k| resolve(k)?.sort_key().map(Expr::into_node))
            .collect::<Result<Vec<_>, _>>()?;
        Node::new(Op::WindowFunction {
            func: self.node().clone(),
            group_by,
            order_by,
            frame: window.frame,
            start: window.start.clone(),
            end: window.end.clone(),
        })
        .map(Expr::from_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::expr::row_number;
    use tessera_types::{DataType, IntervalUnit};

    fn table() -> Table {
        Table::unbound(
            "t",
            &[("g", "string"), ("ts", "timestamp"), ("n", "int32"), ("v", "float64")],
        )
        .unwrap()
    }

    #[test]
    fn test_trailing_range_window() {
        let t = table();
        let w = trailing_range_window(Value::interval(3, IntervalUnit::Day))
            .group_by(["g"])
            .order_by(["ts"]);
        let expr = t.col("v").unwrap().mean().unwrap().over(&w).unwrap();
        match expr.node().op() {
            Op::WindowFunction {
                frame,
                start,
                end,
                group_by,
                order_by,
                ..
            } => {
                assert_eq!(*frame, FrameKind::Range);
                assert_eq!(
                    *start,
                    FrameBound::Preceding(Value::interval(3, IntervalUnit::Day))
                );
                assert_eq!(*end, FrameBound::CurrentRow);
                assert_eq!(group_by.len(), 1);
                assert_eq!(order_by.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(expr.is_column());
        assert_eq!(expr.dtype(), &DataType::float64());
        assert_eq!(expr.name().unwrap(), "v");
    }

    #[test]
    fn test_range_frame_needs_one_order_key() {
        let t = table();
        let v = t.col("v").unwrap().sum().unwrap();
        let none = trailing_range_window(Value::interval(1, IntervalUnit::Hour));
        assert!(matches!(
            v.over(&none),
            Err(IrError::Validation(ValidationError::Frame(_)))
        ));
        let two = none.clone().order_by(["ts", "n"]);
        assert!(v.over(&two).is_err());

        let unbounded = Window::new().range(FrameBound::Unbounded, FrameBound::CurrentRow);
        assert!(matches!(
            v.over(&unbounded),
            Err(IrError::Validation(ValidationError::Frame(_)))
        ));
        assert!(v.over(&unbounded.clone().order_by(["ts", "n"])).is_err());
        assert!(v.over(&unbounded.clone().order_by(["g"])).is_err());
        assert!(v.over(&unbounded.order_by(["ts"])).is_ok());
    }

    #[test]
    fn test_range_bound_must_match_key_type() {
        let t = table();
        let v = t.col("v").unwrap().sum().unwrap();
        let interval_on_number =
            trailing_range_window(Value::interval(1, IntervalUnit::Day)).order_by(["n"]);
        assert!(v.over(&interval_on_number).is_err());
        let number_on_number = trailing_range_window(5).order_by(["n"]);
        assert!(v.over(&number_on_number).is_ok());
        let number_on_time = trailing_range_window(5).order_by(["ts"]);
        assert!(v.over(&number_on_time).is_err());
    }

    #[test]
    fn test_over_does_not_touch_window_or_other_uses() {
        let t = table();
        let sum = t.col("v").unwrap().sum().unwrap();
        let w = cumulative_window().order_by(["ts"]);
        let before = w.clone();
        let a = sum.over(&w).unwrap();
        let b = sum.over(&trailing_window(2).order_by(["ts"])).unwrap();
        assert_eq!(w, before);
        assert_ne!(a, b);
        assert!(sum.is_scalar());
    }

    #[test]
    fn test_alias_survives_over() {
        let t = table();
        let expr = t
            .col("v")
            .unwrap()
            .sum()
            .unwrap()
            .alias("running")
            .unwrap()
            .over(&cumulative_window().order_by(["ts"]))
            .unwrap();
        assert_eq!(expr.name().unwrap(), "running");
        assert!(matches!(expr.node().op(), Op::Alias { .. }));
    }

    #[test]
    fn test_non_window_function_rejected() {
        let t = table();
        let err = t.col("v").unwrap().add(1).unwrap().over(&Window::new()).unwrap_err();
        assert!(matches!(
            err,
            IrError::Validation(ValidationError::NotWindowable(_))
        ));
    }

    #[test]
    fn test_named_keys_need_a_table() {
        let err = row_number()
            .unwrap()
            .over(&Window::new().order_by(["ts"]))
            .unwrap_err();
        assert!(matches!(err, IrError::Relation(_)));
        let t = table();
        let ordered = row_number()
            .unwrap()
            .over(&Window::new().order_by([t.col("ts").unwrap()]))
            .unwrap();
        assert_eq!(ordered.name().unwrap(), "row_number");
    }

    #[test]
    fn test_frame_start_after_end() {
        let t = table();
        let w = Window::new()
            .order_by(["n"])
            .range(FrameBound::Following(Value::Int(2)), FrameBound::Preceding(Value::Int(1)));
        let err = t.col("n").unwrap().sum().unwrap().over(&w);
        assert!(err.is_err());
    }
}
