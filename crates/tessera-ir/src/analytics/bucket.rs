//! Bucketing and histograms.
//!
//! Both build a single analytic node that records its parameters.
//! [`expand_bucket`] and [`expand_histogram`] lower those nodes into
//! primitive expressions for backends without a native form.

use tessera_types::{DataType, Value};

use crate::analytics::window::Window;
use crate::error::{IrError, ValidationError};
use crate::expr::{case, typed_lit, CaseBuilder, Expr, IntoExpr};
use crate::ir::{Closed, Op};
use crate::node::Node;

/// Builder for [`Expr::bucket`].
#[derive(Debug, Clone)]
pub struct BucketBuilder {
    arg: Expr,
    edges: Vec<Value>,
    closed: Closed,
    close_extreme: bool,
    include_under: bool,
    include_over: bool,
}

impl Expr {
    /// Assign each value to the interval between consecutive `edges`.
    pub fn bucket<I, V>(&self, edges: I) -> BucketBuilder
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        BucketBuilder {
            arg: self.clone(),
            edges: edges.into_iter().map(Into::into).collect(),
            closed: Closed::Left,
            close_extreme: true,
            include_under: false,
            include_over: false,
        }
    }

    /// Equal-width bins over this column.
    pub fn histogram(&self) -> HistogramBuilder {
        HistogramBuilder {
            arg: self.clone(),
            nbins: None,
            binwidth: None,
            base: None,
            closed: Closed::Left,
        }
    }
}

impl BucketBuilder {
    /// Which side of each interval is closed: `"left"` or `"right"`.
    pub fn closed(mut self, side: &str) -> Result<Self, IrError> {
        self.closed = side.parse()?;
        Ok(self)
    }

    /// Close the open end of the outermost interval.
    pub fn close_extreme(mut self, yes: bool) -> Self {
        self.close_extreme = yes;
        self
    }

    /// Add a bucket for values below the first edge.
    pub fn include_under(mut self, yes: bool) -> Self {
        self.include_under = yes;
        self
    }

    /// Add a bucket for values above the last edge.
    pub fn include_over(mut self, yes: bool) -> Self {
        self.include_over = yes;
        self
    }

    pub fn build(self) -> Result<Expr, IrError> {
        Node::new(Op::Bucket {
            arg: self.arg.into_node(),
            edges: self.edges,
            closed: self.closed,
            close_extreme: self.close_extreme,
            include_under: self.include_under,
            include_over: self.include_over,
        })
        .map(Expr::from_node)
    }
}

/// Lower a bucket into a `CASE` yielding the bucket ordinal, or null for
/// values outside every bucket.
pub fn expand_bucket(bucket: &Expr) -> Result<Expr, IrError> {
    let Op::Bucket {
        arg,
        edges,
        closed,
        close_extreme,
        include_under,
        include_over,
    } = bucket.node().op()
    else {
        return Err(IrError::TypeMismatch {
            op: "expand_bucket".to_string(),
            arg: "bucket".to_string(),
            expected: "Bucket".to_string(),
            found: bucket.node().kind().name(),
        });
    };
    let x = Expr::from_node(arg.clone());
    let left = *closed == Closed::Left;
    let interior = edges.len().saturating_sub(1);
    // close_extreme only matters when there is an interval to close
    let close_extreme = *close_extreme && interior > 0;

    let mut ordinal = 0i64;
    let mut out = case();
    let mut push = |out: CaseBuilder, cond: Expr| -> Result<CaseBuilder, IrError> {
        let result = typed_lit(ordinal, DataType::int64())?;
        ordinal += 1;
        out.when(cond, result)
    };

    let (Some(first), Some(last)) = (edges.first(), edges.last()) else {
        return Err(ValidationError::EmptyEdges.into());
    };

    if *include_under {
        let cond = if left || close_extreme {
            x.lt(first.clone())?
        } else {
            x.lt_eq(first.clone())?
        };
        out = push(out, cond)?;
    }
    for (i, pair) in edges.windows(2).enumerate() {
        let (lo, hi) = (pair[0].clone(), pair[1].clone());
        let cond = if left {
            let upper = if close_extreme && i + 1 == interior {
                x.lt_eq(hi)?
            } else {
                x.lt(hi)?
            };
            x.gt_eq(lo)?.and(upper)?
        } else {
            let lower = if close_extreme && i == 0 {
                x.gt_eq(lo)?
            } else {
                x.gt(lo)?
            };
            lower.and(x.lt_eq(hi)?)?
        };
        out = push(out, cond)?;
    }
    if *include_over {
        let cond = if left && !close_extreme {
            x.gt_eq(last.clone())?
        } else {
            x.gt(last.clone())?
        };
        out = push(out, cond)?;
    }
    out.otherwise(typed_lit(Value::Null, DataType::int64())?)
}

/// Builder for [`Expr::histogram`].
#[derive(Debug, Clone)]
pub struct HistogramBuilder {
    arg: Expr,
    nbins: Option<u64>,
    binwidth: Option<Value>,
    base: Option<Value>,
    closed: Closed,
}

impl HistogramBuilder {
    pub fn nbins(mut self, n: u64) -> Self {
        self.nbins = Some(n);
        self
    }

    pub fn binwidth(mut self, width: impl Into<Value>) -> Self {
        self.binwidth = Some(width.into());
        self
    }

    /// Left edge of the first bin. Defaults to the column minimum.
    pub fn base(mut self, base: impl Into<Value>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn closed(mut self, side: &str) -> Result<Self, IrError> {
        self.closed = side.parse()?;
        Ok(self)
    }

    pub fn build(self) -> Result<Expr, IrError> {
        Node::new(Op::Histogram {
            arg: self.arg.into_node(),
            nbins: self.nbins,
            binwidth: self.binwidth,
            base: self.base,
            closed: self.closed,
        })
        .map(Expr::from_node)
    }
}

/// Lower a histogram into `floor((x - base) / binwidth)`.
///
/// A missing base is the column minimum and a missing width is the column
/// range over `nbins`; both are computed over the whole column. With a
/// derived width the maximum falls into the last bin instead of one past it.
pub fn expand_histogram(histogram: &Expr) -> Result<Expr, IrError> {
    let Op::Histogram {
        arg,
        nbins,
        binwidth,
        base,
        closed,
    } = histogram.node().op()
    else {
        return Err(IrError::TypeMismatch {
            op: "expand_histogram".to_string(),
            arg: "histogram".to_string(),
            expected: "Histogram".to_string(),
            found: histogram.node().kind().name(),
        });
    };
    let x = Expr::from_node(arg.clone());
    let whole = Window::new();
    let min = x.min()?.over(&whole)?;
    let base = match base {
        Some(b) => b.clone().into_expr()?,
        None => min.clone(),
    };
    let width = match (binwidth, nbins) {
        (Some(w), _) => w.clone().into_expr()?,
        (None, Some(n)) => x.max()?.over(&whole)?.sub(min)?.div(*n as i64)?,
        (None, None) => return Err(ValidationError::HistogramBins.into()),
    };
    let scaled = x.sub(base)?.div(width)?;
    let bin = match closed {
        Closed::Left => scaled.floor()?,
        Closed::Right => scaled.ceil()?.sub(1)?,
    };
    match (binwidth, nbins) {
        (None, Some(n)) => {
            let last = *n as i64 - 1;
            let edge = match closed {
                Closed::Left => bin.gt(last)?,
                Closed::Right => bin.lt(0)?,
            };
            let clamp = match closed {
                Closed::Left => last,
                Closed::Right => 0,
            };
            case()
                .when(edge, typed_lit(clamp, DataType::int64())?)?
                .otherwise(bin)
        }
        _ => Ok(bin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Table;
    use crate::node::Output;

    fn x() -> Expr {
        Table::unbound("t", &[("x", "float64"), ("s", "string")])
            .unwrap()
            .col("x")
            .unwrap()
    }

    fn nbuckets(e: &Expr) -> Option<usize> {
        e.node().op().nbuckets()
    }

    #[test]
    fn test_empty_edges_rejected() {
        let err = x().bucket(Vec::<f64>::new()).build().unwrap_err();
        assert!(matches!(err, IrError::Validation(ValidationError::EmptyEdges)));
    }

    #[test]
    fn test_single_edge_needs_both_sides() {
        assert!(matches!(
            x().bucket([1.0]).build(),
            Err(IrError::Validation(ValidationError::SingleEdge))
        ));
        assert!(x().bucket([1.0]).include_under(true).build().is_err());
        assert!(x().bucket([1.0]).include_over(true).build().is_err());
        let both = x()
            .bucket([1.0])
            .include_under(true)
            .include_over(true)
            .build()
            .unwrap();
        assert_eq!(nbuckets(&both), Some(2));
    }

    #[test]
    fn test_bucket_count() {
        let b = x().bucket([0, 10, 20]).build().unwrap();
        assert_eq!(nbuckets(&b), Some(2));
        assert_eq!(b.dtype(), &DataType::category(Some(2)));
        let all = x()
            .bucket([0, 10, 20])
            .include_under(true)
            .include_over(true)
            .build()
            .unwrap();
        assert_eq!(nbuckets(&all), Some(4));
    }

    #[test]
    fn test_invalid_closed_rejected() {
        let err = x().bucket([0, 1]).closed("invalid").unwrap_err();
        assert!(matches!(
            err,
            IrError::Validation(ValidationError::InvalidClosed(ref s)) if s == "invalid"
        ));
    }

    #[test]
    fn test_unordered_or_non_numeric_edges_rejected() {
        assert!(x().bucket([2, 1]).build().is_err());
        assert!(x().bucket(["a", "b"]).build().is_err());
    }

    #[test]
    fn test_bucket_requires_numeric_column() {
        let t = Table::unbound("t", &[("s", "string")]).unwrap();
        assert!(matches!(
            t.col("s").unwrap().bucket([0, 1]).build(),
            Err(IrError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_expand_bucket_case_arms() {
        let b = x()
            .bucket([0, 10, 20])
            .include_under(true)
            .include_over(true)
            .build()
            .unwrap();
        let expanded = expand_bucket(&b).unwrap();
        match expanded.node().op() {
            Op::SearchedCase {
                conditions,
                results,
                ..
            } => {
                assert_eq!(conditions.len(), 4);
                let ordinals: Vec<_> = results
                    .iter()
                    .map(|r| match r.op() {
                        Op::Literal { value, .. } => value.clone(),
                        other => panic!("unexpected {other:?}"),
                    })
                    .collect();
                assert_eq!(ordinals, (0..4).map(Value::Int).collect::<Vec<_>>());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(expanded.node().output(), &Output::Column(DataType::int64()));
    }

    #[test]
    fn test_histogram_bins_xor_width() {
        assert!(matches!(
            x().histogram().build(),
            Err(IrError::Validation(ValidationError::HistogramBins))
        ));
        assert!(matches!(
            x().histogram().nbins(5).binwidth(2.0).build(),
            Err(IrError::Validation(ValidationError::HistogramBins))
        ));
        assert!(x().histogram().nbins(5).build().is_ok());
        assert!(x().histogram().binwidth(2.5).base(0).build().is_ok());
        assert!(x().histogram().closed("middle").is_err());
    }

    #[test]
    fn test_expand_histogram() {
        let fixed = x().histogram().binwidth(2.0).base(1.0).build().unwrap();
        let expanded = expand_histogram(&fixed).unwrap();
        assert!(matches!(expanded.node().op(), Op::Unary { .. }));
        assert_eq!(expanded.dtype(), &DataType::int64());

        let derived = x().histogram().nbins(4).build().unwrap();
        let expanded = expand_histogram(&derived).unwrap();
        assert!(matches!(expanded.node().op(), Op::SearchedCase { .. }));
    }
}
