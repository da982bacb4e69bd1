//! Unified error handling for the route-consolidator library.
//!
//! Only the boundary layers (file I/O, parsing, configuration, HTTP) fail.
//! The consolidation engine itself never returns an error: degenerate input
//! is filtered or dropped and ambiguous geometry is logged.

use thiserror::Error;

/// Error type for route-consolidator operations.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding/decoding failed (config files, coordinate columns)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A row of an input file does not follow the wire format
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    /// Configuration values are out of range
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Directions provider request failed
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },
}

impl ConsolidationError {
    pub(crate) fn malformed(line: u64, message: impl Into<String>) -> Self {
        ConsolidationError::MalformedRecord {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        ConsolidationError::Config {
            message: message.into(),
        }
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

/// Result type alias for route-consolidator operations.
pub type Result<T> = std::result::Result<T, ConsolidationError>;
