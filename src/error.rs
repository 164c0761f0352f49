//! Error types for the detection pipeline.
//!
//! Bad rows are never errors: the sanitizer drops and counts them. Only
//! structural problems that stop every stage end up here.

use thiserror::Error;

/// Errors surfaced to the caller of the pipeline or the I/O layer.
#[derive(Debug, Error)]
pub enum AnomalyError {
    /// A required input column is absent from the header.
    #[error("required column '{column}' is missing from the input")]
    MissingColumn { column: String },

    /// A configuration value lies outside its domain.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnomalyError {
    pub fn missing_column(column: &str) -> Self {
        Self::MissingColumn { column: column.to_string() }
    }

    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field, reason: reason.into() }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AnomalyError>;
