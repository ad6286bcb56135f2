//! Error types for the upload service client.

use std::time::Duration;

use thiserror::Error;

/// A failed request to the upload service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status, when the service answered at all.
    pub status: Option<u16>,

    /// Server-supplied delay before the next attempt.
    pub retry_after: Option<Duration>,

    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// A failure without an HTTP status (connection, timeout, local I/O).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// A non-success HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            retry_after: None,
            message: message.into(),
        }
    }

    pub fn with_retry_after(mut self, delay: Option<Duration>) -> Self {
        self.retry_after = delay;
        self
    }

    /// The service asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            retry_after: None,
            message: err.to_string(),
        }
    }
}
