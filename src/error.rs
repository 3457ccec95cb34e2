use thiserror::Error;

use crate::pipeline::processing::validation::ValidationResult;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The join key is absent from one of the merge inputs
    #[error("Schema mismatch: join key '{key}' is missing from the {side} table")]
    SchemaMismatch { key: String, side: String },

    /// Required column missing or value of the wrong type
    #[error("Schema violation: {} violation(s)", .0.violations.len())]
    SchemaViolation(ValidationResult),

    /// Null or duplicate primary key
    #[error("Identity violation: {} violation(s)", .0.violations.len())]
    IdentityViolation(ValidationResult),

    #[error("Extraction failed for '{source_name}': {message}")]
    Extract { source_name: String, message: String },

    #[error("Load failed in '{loader}': {message}")]
    Load { loader: String, message: String },
}

impl PipelineError {
    /// Violation list carried by validator failures, if any
    pub fn violations(&self) -> Option<&ValidationResult> {
        match self {
            PipelineError::SchemaViolation(result) | PipelineError::IdentityViolation(result) => Some(result),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
