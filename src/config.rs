use crate::schema::DEFAULT_ALLOWED_COLUMN_CHARS;
use clap::ValueEnum;
use std::path::PathBuf;

/// When schemas are inferred relative to flattening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InferenceMode {
    /// Feed every row to its table's schema as it is written
    #[default]
    Inline,
    /// Flatten everything first, then read the flattened files back
    TwoPhase,
}

/// Format of the converted, load-ready files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Newline-delimited JSON
    #[default]
    Json,
    /// CSV with a header of every output column
    Csv,
}

/// Configuration for a local relationalize run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name of the root table; sub-tables are prefixed with it
    pub table: String,

    /// Database schema used in generated DDL
    pub schema_name: String,

    /// Flattened files go to `<output_dir>/temp`, load-ready files and DDL
    /// to `<output_dir>/final`
    pub output_dir: PathBuf,

    pub mode: InferenceMode,

    pub format: OutputFormat,

    /// Drop columns that only ever held nulls
    pub drop_null_columns: bool,

    /// Drop columns whose names contain characters outside
    /// alphanumerics and `allowed_column_chars`
    pub drop_special_char_columns: bool,

    pub allowed_column_chars: Vec<char>,

    /// Drop columns that case-insensitively repeat an earlier column
    pub drop_duplicate_columns: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            table: String::from("root"),
            schema_name: String::from("public"),
            output_dir: PathBuf::from("output"),
            mode: InferenceMode::default(),
            format: OutputFormat::default(),
            drop_null_columns: false,
            drop_special_char_columns: false,
            allowed_column_chars: DEFAULT_ALLOWED_COLUMN_CHARS.to_vec(),
            drop_duplicate_columns: false,
        }
    }
}
