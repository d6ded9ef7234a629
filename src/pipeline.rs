//! End-to-end local pipeline
//!
//! A run has two stages so that shards can be flattened apart and then
//! converted against one merged set of schemas.
//!
//! [`flatten`]:
//! 1. Relationalize records into `<output_dir>/temp/<table>.json`
//! 2. Infer one schema per table (inline or from the flattened files)
//! 3. Write the inferred schemas to `<output_dir>/schemas.json`
//!
//! [`convert`]:
//! 4. Apply the configured schema hygiene
//! 5. Convert every flattened row into `<output_dir>/final/<table>.{json,csv}`
//! 6. Write `<output_dir>/final/DDL_<table>.sql`
//!
//! [`run`] does both over one shard. For several shards, flatten each one,
//! merge their `schemas.json` files with [`merge_schema_sets`], and convert
//! each shard against the merged set.

use crate::config::{InferenceMode, OutputFormat, PipelineConfig};
use crate::melt::{table_file_name, LocalFileOutput, Relationalizer, Row, SchemaCollector};
use crate::reader::ndjson_rows;
use crate::schema::{ColumnType, PostgresDialect, Schema};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TEMP_DIR: &str = "temp";
const FINAL_DIR: &str = "final";

/// File holding every table's inferred schema, relative to the output dir
pub const SCHEMA_SET_FILE: &str = "schemas.json";

/// One schema per table key, in first-write order
pub type SchemaSet = IndexMap<String, Schema>;

/// Summary of one output table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub dropped_columns: usize,
}

/// Summary of a pipeline run, one entry per table in first-write order
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub tables: Vec<TableReport>,
}

impl PipelineReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Run the whole pipeline over `records`
pub fn run<I>(records: I, config: &PipelineConfig) -> Result<PipelineReport>
where
    I: IntoIterator<Item = Value>,
{
    let schemas = flatten(records, config)?;
    convert(schemas, config)
}

/// Relationalize `records` into `<output_dir>/temp`, infer their schemas and
/// persist them to `<output_dir>/schemas.json`
pub fn flatten<I>(records: I, config: &PipelineConfig) -> Result<SchemaSet>
where
    I: IntoIterator<Item = Value>,
{
    let temp_dir = config.output_dir.join(TEMP_DIR);
    let factory = LocalFileOutput::new(&temp_dir)
        .with_context(|| format!("Failed to create {}", temp_dir.display()))?;

    info!(table = %config.table, mode = ?config.mode, "Relationalizing records");
    let schemas = match config.mode {
        InferenceMode::Inline => {
            let mut relationalizer =
                Relationalizer::new(&config.table, factory.clone()).with_observer(SchemaCollector::new());
            relationalizer
                .relationalize(records)
                .context("Failed to relationalize records")?;
            relationalizer.finish()?.observer.into_schemas()
        }
        InferenceMode::TwoPhase => {
            let mut relationalizer = Relationalizer::new(&config.table, factory.clone());
            relationalizer
                .relationalize(records)
                .context("Failed to relationalize records")?;
            let finished = relationalizer.finish()?;
            let table_keys: Vec<String> = finished.outputs.keys().cloned().collect();
            drop(finished);

            info!(tables = table_keys.len(), "Inferring schemas from flattened files");
            let mut schemas = SchemaSet::new();
            for table_key in table_keys {
                let schema = infer_schema_from_file(&factory.path_for(&table_key))?;
                schemas.insert(table_key, schema);
            }
            schemas
        }
    };

    write_schema_set(&config.output_dir.join(SCHEMA_SET_FILE), &schemas)?;
    Ok(schemas)
}

/// Convert the rows flattened into `<output_dir>/temp` against `schemas` and
/// write load-ready files and DDL to `<output_dir>/final`.
///
/// Tables in `schemas` with no flattened file in this output dir (another
/// shard saw them, this one did not) get DDL but no rows.
pub fn convert(mut schemas: SchemaSet, config: &PipelineConfig) -> Result<PipelineReport> {
    let temp_dir = config.output_dir.join(TEMP_DIR);
    let final_dir = config.output_dir.join(FINAL_DIR);
    fs::create_dir_all(&final_dir)
        .with_context(|| format!("Failed to create {}", final_dir.display()))?;

    let mut report = PipelineReport::default();
    for (table_key, schema) in schemas.iter_mut() {
        let dropped_columns = apply_hygiene(schema, config);
        let source = temp_dir.join(table_file_name(table_key, "json"));

        let rows = if source.exists() {
            info!(table = %table_key, "Converting rows");
            match config.format {
                OutputFormat::Json => convert_to_json(
                    schema,
                    &source,
                    &final_dir.join(table_file_name(table_key, "json")),
                )?,
                OutputFormat::Csv => convert_to_csv(
                    schema,
                    &source,
                    &final_dir.join(table_file_name(table_key, "csv")),
                )?,
            }
        } else {
            debug!(table = %table_key, "No flattened rows in this output dir");
            0
        };

        if schema.is_empty() {
            warn!(table = %table_key, "No columns left, skipping DDL");
        } else {
            let ddl = schema
                .generate_ddl(table_key, &config.schema_name)
                .with_context(|| format!("Failed to generate DDL for {}", table_key))?;
            let ddl_path = final_dir.join(format!("DDL_{}", table_file_name(table_key, "sql")));
            fs::write(&ddl_path, ddl)
                .with_context(|| format!("Failed to write {}", ddl_path.display()))?;
        }

        report.tables.push(TableReport {
            table: table_key.clone(),
            rows,
            columns: schema.generate_output_columns().len(),
            dropped_columns,
        });
    }

    info!(tables = report.tables.len(), "Pipeline complete");
    Ok(report)
}

/// Build a schema from a newline-delimited JSON file of flat rows
pub fn infer_schema_from_file(path: &Path) -> Result<Schema> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut schema = Schema::new();
    for row in ndjson_rows(BufReader::new(file)) {
        schema.read_object(&row?);
    }
    Ok(schema)
}

/// Render a schema set as a JSON object of table key to serialized schema
pub fn serialize_schema_set(schemas: &SchemaSet) -> Result<String> {
    let view: IndexMap<&str, &IndexMap<String, ColumnType>> = schemas
        .iter()
        .map(|(table_key, schema)| (table_key.as_str(), schema.columns()))
        .collect();
    Ok(serde_json::to_string_pretty(&view)?)
}

/// Parse a schema set produced by [`serialize_schema_set`]
pub fn deserialize_schema_set(content: &str) -> Result<SchemaSet> {
    let tables: IndexMap<String, IndexMap<String, ColumnType>> = serde_json::from_str(content)?;
    Ok(tables
        .into_iter()
        .map(|(table_key, columns)| (table_key, Schema::from_columns(columns, PostgresDialect)))
        .collect())
}

pub fn write_schema_set(path: &Path, schemas: &SchemaSet) -> Result<()> {
    fs::write(path, serialize_schema_set(schemas)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_schema_set(path: &Path) -> Result<SchemaSet> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    deserialize_schema_set(&content)
        .with_context(|| format!("Failed to parse schema set {}", path.display()))
}

/// Merge the schema sets of several shards table by table
pub fn merge_schema_sets(paths: &[PathBuf]) -> Result<SchemaSet> {
    let mut merged = SchemaSet::new();
    for path in paths {
        for (table_key, schema) in read_schema_set(path)? {
            merged.entry(table_key).or_default().merge_from(&schema);
        }
    }
    Ok(merged)
}

fn apply_hygiene(schema: &mut Schema, config: &PipelineConfig) -> usize {
    let mut dropped = 0;
    if config.drop_null_columns {
        dropped += schema.drop_null_columns();
    }
    if config.drop_special_char_columns {
        dropped += schema.drop_special_char_columns(&config.allowed_column_chars);
    }
    if config.drop_duplicate_columns {
        dropped += schema.drop_duplicate_columns();
    }
    dropped
}

fn convert_to_json(schema: &Schema, source: &Path, destination: &Path) -> Result<usize> {
    let input = File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let output = File::create(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let mut writer = BufWriter::new(output);

    let mut rows = 0;
    for row in ndjson_rows(BufReader::new(input)) {
        let converted = schema.convert_object(row?)?;
        serde_json::to_writer(&mut writer, &converted)?;
        writer.write_all(b"\n")?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

fn convert_to_csv(schema: &Schema, source: &Path, destination: &Path) -> Result<usize> {
    let input = File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut writer = csv::Writer::from_path(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let columns = schema.generate_output_columns();
    writer.write_record(&columns)?;

    let mut rows = 0;
    for row in ndjson_rows(BufReader::new(input)) {
        let converted = schema.convert_object(row?)?;
        writer.write_record(columns.iter().map(|column| csv_field(&converted, column)))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Render one CSV cell; missing and null values are empty
fn csv_field(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
