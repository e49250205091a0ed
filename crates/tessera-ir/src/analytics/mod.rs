//! Analytic constructs layered over the primitive operations.

pub mod bucket;
pub mod topk;
pub mod udf;
pub mod window;

pub use bucket::{expand_bucket, expand_histogram, BucketBuilder, HistogramBuilder};
pub use topk::{RankBy, TopK};
pub use udf::{Udf, UdfFunction, UdfKind};
pub use window::{cumulative_window, trailing_range_window, trailing_window, Window, WindowKey};
