//! Type system for Tessera.
//!
//! This crate provides:
//! - Data types and their canonical text form (`types`)
//! - A lexer and parser for the type grammar (`lexer`, `parser`)
//! - Type promotion (`promote`)
//! - Ordered schemas (`schema`)
//! - Literal values (`value`)

pub mod error;
pub mod lexer;
pub mod parser;
pub mod promote;
pub mod schema;
pub mod span;
pub mod token;
pub mod types;
pub mod value;

pub use error::{SchemaError, TypeParseError, TypePromotionError};
pub use parser::parse_type;
pub use promote::{can_cast_implicit, promote, promote_all};
pub use schema::Schema;
pub use span::Span;
pub use types::{DataType, IntervalUnit, TypeKind};
pub use value::Value;
