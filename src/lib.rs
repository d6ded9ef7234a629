//! # Relationalize - nested JSON to linked relational tables
//!
//! Flattens nested JSON records into several flat, linked row streams and
//! infers a choice-aware schema for each of them, ready to be rendered as a
//! `CREATE TABLE` statement.
//!
//! ## Modules
//!
//! - **melt**: Flatten nested records into linked tables
//! - **schema**: Infer column types, split choice columns, render DDL
//! - **pipeline**: Run flatten, infer, convert and DDL against a local directory
//!
//! ## Quick Start
//!
//! ```rust
//! use relationalize::melt::{BufferOutput, Relationalizer, SchemaCollector};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let records = vec![
//!     json!({"id": 1, "tags": ["a", "b"]}),
//!     json!({"id": "two", "tags": []}),
//! ];
//!
//! let mut relationalizer = Relationalizer::new("users", BufferOutput)
//!     .with_observer(SchemaCollector::new());
//! relationalizer.relationalize(records)?;
//! let finished = relationalizer.finish()?;
//!
//! // "users" holds the root rows, "users_tags" one row per tag
//! let schemas = finished.observer.into_schemas();
//! let ddl = schemas["users"].generate_ddl("users", "public")?;
//! assert!(ddl.contains("\"id_int\" BIGINT"));
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::io::Read;

pub mod config;
pub mod error;
pub mod melt;
pub mod pipeline;
pub mod reader;
pub mod schema;

pub use config::{InferenceMode, OutputFormat, PipelineConfig};
pub use error::{RelationalizeError, SchemaError};
pub use melt::{BufferOutput, LocalFileOutput, Relationalizer, Row, SchemaCollector};
pub use pipeline::{PipelineReport, SchemaSet};
pub use schema::{ColumnType, PostgresDialect, Primitive, Schema, SqlDialect};

/// Main entry point: relationalize a JSON or NDJSON stream into
/// `config.output_dir`, producing load-ready files and DDL
pub fn relationalize_json<R: Read>(reader: R, config: &PipelineConfig) -> Result<PipelineReport> {
    let records = reader::read_records(reader)?;
    pipeline::run(records, config)
}
