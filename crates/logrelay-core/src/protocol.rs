//! Task Protocol shared between a coordinator and its workers.
//!
//! Every request except `Shutdown` carries a [`TaskId`]; every response
//! except `Ready`/`ShutdownAck` echoes it back. A worker sends `Ready`
//! exactly once at startup before any request is dispatched to it, and
//! `Shutdown`/`ShutdownAck` is the cooperative drain handshake.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::{MetricsInput, MetricsResult};
use crate::result::ExternalToolResult;
use crate::settings::ExternalToolSettings;
use crate::TaskId;

/// Payload for an external tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalToolRequest {
    /// Combat log to analyze.
    pub file_path: PathBuf,
    /// Key for the result cache; no caching when absent.
    #[serde(default)]
    pub cache_key: Option<String>,
    /// Tool settings at the time of the request.
    pub settings: ExternalToolSettings,
    /// Upload-service token written into the tool configuration.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl ExternalToolRequest {
    pub fn new(file_path: impl Into<PathBuf>, settings: ExternalToolSettings) -> Self {
        Self {
            file_path: file_path.into(),
            cache_key: None,
            settings,
            auth_token: None,
        }
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Request sent from the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    /// SHA-256 digest of a file.
    Hash { id: TaskId, file_path: PathBuf },

    /// Read and parse a JSON document, optionally gzip-compressed.
    JsonParse {
        id: TaskId,
        file_path: PathBuf,
        is_gzipped: bool,
    },

    /// Aggregate per-player metrics.
    Metrics { id: TaskId, payload: Box<MetricsInput> },

    /// Invoke the external analysis tool.
    RunExternal {
        id: TaskId,
        payload: ExternalToolRequest,
    },

    /// Cooperative drain request.
    Shutdown,
}

impl WorkerRequest {
    /// Correlation id, absent for `Shutdown`.
    pub fn id(&self) -> Option<&TaskId> {
        match self {
            Self::Hash { id, .. }
            | Self::JsonParse { id, .. }
            | Self::Metrics { id, .. }
            | Self::RunExternal { id, .. } => Some(id),
            Self::Shutdown => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hash { .. } => "HASH",
            Self::JsonParse { .. } => "JSON_PARSE",
            Self::Metrics { .. } => "METRICS",
            Self::RunExternal { .. } => "RUN_EXTERNAL",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// Response sent from a worker back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    HashResult { id: TaskId, hash: String },

    JsonParseResult { id: TaskId, data: Value },

    MetricsResult { id: TaskId, result: Box<MetricsResult> },

    ExternalResult {
        id: TaskId,
        result: Box<ExternalToolResult>,
    },

    /// The task failed inside the worker.
    Error {
        id: TaskId,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Sent once at worker startup.
    Ready,

    /// Acknowledges `Shutdown`; the worker exits right after.
    ShutdownAck,
}

impl WorkerResponse {
    /// Correlation id, absent for lifecycle messages.
    pub fn id(&self) -> Option<&TaskId> {
        match self {
            Self::HashResult { id, .. }
            | Self::JsonParseResult { id, .. }
            | Self::MetricsResult { id, .. }
            | Self::ExternalResult { id, .. }
            | Self::Error { id, .. } => Some(id),
            Self::Ready | Self::ShutdownAck => None,
        }
    }

    /// Build an error response from any displayable error.
    pub fn error(id: TaskId, error: impl std::fmt::Display) -> Self {
        Self::Error {
            id,
            error: error.to_string(),
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_tags() {
        let request = WorkerRequest::JsonParse {
            id: TaskId::new("t1"),
            file_path: "a.json.gz".into(),
            is_gzipped: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "JSON_PARSE");
        assert_eq!(value["id"], "t1");
        assert_eq!(request.kind(), "JSON_PARSE");

        let value = serde_json::to_value(WorkerRequest::Shutdown).unwrap();
        assert_eq!(value, json!({"type": "SHUTDOWN"}));
        assert!(WorkerRequest::Shutdown.id().is_none());
    }

    #[test]
    fn test_response_tags_and_ids() {
        let response: WorkerResponse =
            serde_json::from_value(json!({"type": "HASH_RESULT", "id": "t2", "hash": "ab"})).unwrap();
        assert_eq!(response.id(), Some(&TaskId::new("t2")));

        let ready: WorkerResponse = serde_json::from_value(json!({"type": "READY"})).unwrap();
        assert_eq!(ready, WorkerResponse::Ready);
        assert!(ready.id().is_none());

        let ack = serde_json::to_value(WorkerResponse::ShutdownAck).unwrap();
        assert_eq!(ack["type"], "SHUTDOWN_ACK");
    }
}
