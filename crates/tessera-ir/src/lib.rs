//! Tessera intermediate representation
//!
//! Immutable, typed expression graphs. Users build [`Table`] and [`Expr`]
//! values; each wraps a validated [`Node`] that backends later compile.

pub mod analytics;
mod builder;
pub mod config;
pub mod error;
pub mod expr;
pub mod ir;
pub mod lineage;
pub mod node;
pub mod repr;

pub use analytics::{
    cumulative_window, expand_bucket, expand_histogram, trailing_range_window, trailing_window,
    RankBy, TopK, Udf, UdfFunction, UdfKind, Window,
};
pub use config::{options, set_options, Options, ReprOptions, SqlOptions};
pub use error::{IrError, UdfError, ValidationError};
pub use expr::{case, lit, row_number, typed_lit, Expr, GroupedTable, IntoExpr, Selection, Table};
pub use ir::*;
pub use node::{Arg, Node, NodeRef, OpKind, Output};
