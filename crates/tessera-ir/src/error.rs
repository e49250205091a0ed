//! Errors raised while building IR.

use tessera_types::{DataType, SchemaError, TypeParseError, TypePromotionError};
use thiserror::Error;

/// Errors that can occur while constructing IR nodes.
#[derive(Error, Debug, Clone)]
pub enum IrError {
    /// An argument does not satisfy the operation's type contract.
    #[error("{op}: argument '{arg}' must be {expected}, found {found}")]
    TypeMismatch {
        op: String,
        arg: String,
        expected: String,
        found: String,
    },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("expression has no name: {0}")]
    UnnamedExpression(String),

    #[error("invalid relation: {0}")]
    Relation(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parse(#[from] TypeParseError),

    #[error(transparent)]
    Promotion(#[from] TypePromotionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl IrError {
    pub fn type_mismatch(
        op: impl Into<String>,
        arg: impl Into<String>,
        expected: impl Into<String>,
        found: &DataType,
    ) -> Self {
        IrError::TypeMismatch {
            op: op.into(),
            arg: arg.into(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn relation(message: impl Into<String>) -> Self {
        IrError::Relation(message.into())
    }
}

/// Invalid parameters to an analytic construct.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("bucket edges must not be empty")]
    EmptyEdges,

    #[error("a single bucket edge requires both include_under and include_over")]
    SingleEdge,

    #[error("bucket edges must be numeric and strictly increasing")]
    UnorderedEdges,

    #[error("closed must be 'left' or 'right', found '{0}'")]
    InvalidClosed(String),

    #[error("specify exactly one of nbins and binwidth")]
    HistogramBins,

    #[error("invalid window frame: {0}")]
    Frame(String),

    #[error("{0} cannot be computed over a window")]
    NotWindowable(String),

    #[error("top-k count must be positive")]
    TopKCount,
}

/// Error returned by a user-defined function body.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct UdfError(pub String);
