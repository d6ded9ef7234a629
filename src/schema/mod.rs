//! Schema inference for flattened rows
//!
//! This module infers per-column types from observed rows, resolves columns
//! with conflicting types into choice columns, and renders matching DDL.

pub mod builder;
pub mod column;
pub mod dialect;

pub use builder::{Schema, DEFAULT_ALLOWED_COLUMN_CHARS};
pub use column::{classify, Choice, ColumnType, Primitive};
pub use dialect::{PostgresDialect, SqlDialect};
