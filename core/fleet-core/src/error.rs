//! Error types for fleet-core operations.
//!
//! The discovery path never surfaces these to callers: enumeration and cache
//! failures degrade to empty or recomputed values. They exist so the internal
//! layers can use `?` and so configuration loading can report what went wrong.

use std::path::PathBuf;

/// All errors that can occur inside fleet-core.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // External Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    CommandTimedOut { command: String, timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using FleetError.
pub type Result<T> = std::result::Result<T, FleetError>;

impl From<FleetError> for String {
    fn from(err: FleetError) -> String {
        err.to_string()
    }
}
