// crates/olist-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source '{name}' unavailable at {location}: {source}")]
    SourceUnavailable {
        name: String,
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("join key '{key}' missing from {side} side")]
    JoinKeyMissing { key: String, side: String },

    #[error("failed to write table '{table}': {message}")]
    SinkWriteFailure { table: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
