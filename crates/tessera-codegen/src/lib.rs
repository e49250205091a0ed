//! Tessera Code Generation
//!
//! Backends that compile Tessera IR, the registry they are looked up in,
//! and routing from an expression to the backend it belongs to.

pub mod backend;
pub mod dispatch;
pub mod registry;
pub mod spark;
pub mod sql;

pub use backend::*;
pub use dispatch::{backend_for, compile, compile_with, connect, execute, sources, Compile, Connection};
pub use registry::{backend, backend_names, register_backend};
pub use spark::SparkBackend;
pub use sql::{to_sql, SqlBackend};
