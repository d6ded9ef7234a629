use thiserror::Error;

/// Errors raised by the schema engine
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A choice column received a value whose type is not one of its members
    #[error("column `{column}` has type `{expected}` but the value is of type `{found}`")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// A column of unsupported type cannot be rendered as a physical column
    #[error("column `{column}` has unsupported type `{type_name}`")]
    UnsupportedColumn { column: String, type_name: String },

    #[error("invalid column type tag: {0}")]
    InvalidColumnType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while flattening records into tables
#[derive(Error, Debug)]
pub enum RelationalizeError {
    /// The record handed to the flattener was not a JSON object
    #[error("expected a JSON object at the root of the record, found {0}")]
    Structural(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
