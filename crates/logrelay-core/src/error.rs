//! Core domain errors.

use thiserror::Error;

/// Errors raised by the pure job functions.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading an input file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Gzip stream could not be inflated.
    #[error("Failed to decompress '{path}': {source}")]
    Decompress {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON document did not parse.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
