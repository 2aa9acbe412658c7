//! Error types for the screener backend.
//!
//! - [`ConfigError`] - Settings, report types and group files
//! - [`StoreError`] - Snapshot store errors
//! - [`PipelineError`] - Load and enrich orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Row parsing keeps its own positional error type in [`crate::parser::ParseError`];
//! it converts into [`PipelineError`] so `?` works across module boundaries.
//!
//! Row enrichment itself never fails: missing inputs become null outputs.

use thiserror::Error;

use crate::parser::ParseError;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading settings or group definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown report type.
    #[error("Unknown report type: {0} (expected legacy, disagg or tff)")]
    UnknownReportType(String),

    /// Unknown report subtype.
    #[error("Unknown subtype: {0} (expected fo or co)")]
    UnknownSubtype(String),

    /// Environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    /// Group file failed schema validation.
    #[error("Invalid groups file: {}", .0.join("; "))]
    InvalidGroups(Vec<String>),

    /// IO error.
    #[error("Config IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Config JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Snapshot Store Errors
// =============================================================================

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No snapshot for this report type and subtype.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Snapshot content is not an array of rows.
    #[error("Invalid snapshot {name}: {message}")]
    InvalidSnapshot { name: String, message: String },

    /// IO error.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level load/enrich errors.
///
/// This is the error type returned by [`crate::transform::pipeline::enrich_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Row parsing error (CSV or JSON input).
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Input rows are not a JSON array of objects.
    #[error("Invalid rows: {0}")]
    InvalidRows(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownReportType(_) | ConfigError::UnknownSubtype(_) => {
                ServerError::NotFound(err.to_string())
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ServerError::NotFound(err.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for snapshot store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
