//! relationalize: Flatten nested JSON into linked tables with DDL
//!
//! Usage:
//!   # Read NDJSON or a JSON array from a file
//!   relationalize run users.json --table users --output-dir ./out
//!
//!   # Read from stdin, write CSV, drop all-null columns
//!   cat users.json | relationalize run --table users --format csv --drop-null
//!
//!   # Sharded: flatten each shard, merge their schemas, convert each shard
//!   relationalize flatten part_a.json --table users --output-dir ./a
//!   relationalize flatten part_b.json --table users --output-dir ./b
//!   relationalize merge-schemas ./a/schemas.json ./b/schemas.json --output merged.json
//!   relationalize convert --output-dir ./a --schemas merged.json
//!   relationalize convert --output-dir ./b --schemas merged.json

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use relationalize::pipeline::{
    convert, flatten, merge_schema_sets, read_schema_set, serialize_schema_set, write_schema_set,
    PipelineReport, SCHEMA_SET_FILE,
};
use relationalize::schema::DEFAULT_ALLOWED_COLUMN_CHARS;
use relationalize::{InferenceMode, OutputFormat, PipelineConfig};
use std::fs::File;
use std::io::{stdin, Read};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relationalize")]
#[command(about = "Flatten nested JSON into linked relational tables", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten records, infer schemas, convert rows and write DDL
    Run {
        #[command(flatten)]
        flatten: FlattenArgs,

        #[command(flatten)]
        convert: ConvertArgs,
    },

    /// Flatten records and write their inferred schemas, without converting
    Flatten {
        #[command(flatten)]
        flatten: FlattenArgs,
    },

    /// Merge schema sets written by `flatten` or `run`
    MergeSchemas {
        /// Schema set files (`schemas.json` of each shard)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Write the merged set here instead of printing it
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Convert flattened rows against a (merged) schema set and write DDL
    Convert {
        /// Directory a previous `flatten` wrote to
        #[arg(long, short = 'o')]
        output_dir: PathBuf,

        /// Schema set to convert against (default: <output-dir>/schemas.json)
        #[arg(long)]
        schemas: Option<PathBuf>,

        #[command(flatten)]
        convert: ConvertArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct FlattenArgs {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Name of the root table
    #[arg(long, short = 't')]
    table: String,

    /// Output directory (default: ./output)
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// When to infer schemas
    #[arg(long, value_enum, default_value_t = InferenceMode::Inline)]
    mode: InferenceMode,
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Database schema used in the DDL (default: public)
    #[arg(long)]
    schema: Option<String>,

    /// Format of the load-ready files
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Drop columns that only ever held nulls
    #[arg(long)]
    drop_null: bool,

    /// Drop columns with characters other than alphanumerics and --allowed-chars
    #[arg(long)]
    drop_special: bool,

    /// Extra characters allowed by --drop-special (default: space, dash, underscore)
    #[arg(long, requires = "drop_special")]
    allowed_chars: Option<String>,

    /// Drop columns that case-insensitively repeat an earlier column
    #[arg(long)]
    drop_duplicates: bool,
}

impl FlattenArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.table = self.table.clone();
        config.mode = self.mode;
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }

    fn open_input(&self) -> Result<Box<dyn Read>> {
        Ok(match &self.input {
            Some(path) => Box::new(
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
            ),
            None => Box::new(stdin()),
        })
    }
}

impl ConvertArgs {
    fn apply(self, config: &mut PipelineConfig) {
        config.format = self.format;
        config.drop_null_columns = self.drop_null;
        config.drop_special_char_columns = self.drop_special;
        config.drop_duplicate_columns = self.drop_duplicates;
        if let Some(schema) = self.schema {
            config.schema_name = schema;
        }
        config.allowed_column_chars = match self.allowed_chars {
            Some(chars) => chars.chars().collect(),
            None => DEFAULT_ALLOWED_COLUMN_CHARS.to_vec(),
        };
    }
}

fn log_report(report: &PipelineReport) {
    for table in &report.tables {
        info!(
            table = %table.table,
            rows = table.rows,
            columns = table.columns,
            dropped = table.dropped_columns,
            "Wrote table"
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run { flatten, convert } => {
            let mut config = PipelineConfig::default();
            flatten.apply(&mut config);
            convert.apply(&mut config);

            let report = relationalize::relationalize_json(flatten.open_input()?, &config)?;
            log_report(&report);
        }
        Command::Flatten { flatten: args } => {
            let mut config = PipelineConfig::default();
            args.apply(&mut config);

            let records = relationalize::reader::read_records(args.open_input()?)?;
            let schemas = flatten(records, &config)?;
            info!(
                tables = schemas.len(),
                path = %config.output_dir.join(SCHEMA_SET_FILE).display(),
                "Wrote schemas"
            );
        }
        Command::MergeSchemas { files, output } => {
            let merged = merge_schema_sets(&files)?;
            match output {
                Some(path) => write_schema_set(&path, &merged)?,
                None => println!("{}", serialize_schema_set(&merged)?),
            }
        }
        Command::Convert {
            output_dir,
            schemas,
            convert: args,
        } => {
            let mut config = PipelineConfig {
                output_dir,
                ..PipelineConfig::default()
            };
            args.apply(&mut config);

            let schemas_path = schemas.unwrap_or_else(|| config.output_dir.join(SCHEMA_SET_FILE));
            let report = convert(read_schema_set(&schemas_path)?, &config)?;
            log_report(&report);
        }
    }

    Ok(())
}
