//! Error types for the type system.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::span::Span;
use crate::types::DataType;

/// Malformed type text.
#[derive(Error, Diagnostic, Debug, Clone)]
#[error("invalid type: {message}")]
#[diagnostic(code(tessera::types::parse))]
pub struct TypeParseError {
    message: String,
    #[source_code]
    source_code: String,
    #[label("here")]
    label: SourceSpan,
    span: Span,
}

impl TypeParseError {
    pub fn new(message: impl Into<String>, source: &str, span: Span) -> Self {
        Self {
            message: message.into(),
            source_code: source.to_string(),
            label: span.into(),
            span,
        }
    }

    pub fn unexpected_token(
        source: &str,
        span: Span,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        Self::new(format!("expected {}, found {}", expected, found), source, span)
    }

    pub fn unexpected_eof(source: &str, expected: impl std::fmt::Display) -> Self {
        let end = source.len();
        Self::new(
            format!("unexpected end of input, expected {}", expected),
            source,
            Span::new(end, end),
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte range of the offending input.
    pub fn span(&self) -> Span {
        self.span
    }
}

/// No common supertype exists for two types.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot promote {left} and {right} to a common type")]
pub struct TypePromotionError {
    pub left: DataType,
    pub right: DataType,
}

impl TypePromotionError {
    pub fn new(left: &DataType, right: &DataType) -> Self {
        Self {
            left: left.clone(),
            right: right.clone(),
        }
    }
}

/// Schema construction and lookup errors.
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid type for column '{name}'")]
    InvalidType {
        name: String,
        #[source]
        source: TypeParseError,
    },
}
