//! Result types produced by the task layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Runtime variant the external tool actually ran under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Platform-native execution of the executable.
    Native,
    /// Managed package run through a managed-runtime launcher.
    Managed,
    /// Executable run through a compatibility layer.
    Compat,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Managed => write!(f, "managed"),
            Self::Compat => write!(f, "compat"),
        }
    }
}

/// Where an external tool result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Cache,
    Parsed,
    Disabled,
    Error,
}

/// Outcome of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalToolResult {
    pub data: Option<Value>,
    pub source: ToolSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl ExternalToolResult {
    /// The tool is switched off in settings.
    pub fn disabled() -> Self {
        Self {
            data: None,
            source: ToolSource::Disabled,
            error: None,
            runtime: None,
            output_path: None,
        }
    }

    /// A previously cached document.
    pub fn cached(data: Value) -> Self {
        Self {
            data: Some(data),
            source: ToolSource::Cache,
            error: None,
            runtime: None,
            output_path: None,
        }
    }

    /// A freshly produced document.
    pub fn parsed(data: Value, runtime: Runtime, output_path: PathBuf) -> Self {
        Self {
            data: Some(data),
            source: ToolSource::Parsed,
            error: None,
            runtime: Some(runtime),
            output_path: Some(output_path),
        }
    }

    /// A reported failure.
    pub fn error(message: impl Into<String>, runtime: Option<Runtime>) -> Self {
        Self {
            data: None,
            source: ToolSource::Error,
            error: Some(message.into()),
            runtime,
            output_path: None,
        }
    }
}

/// Terminal outcome of one file submission to the upload service.
///
/// A failed upload still produces a value; `error` and `status_code`
/// describe what went wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub id: String,
    pub permalink: String,
    pub user_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fight_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl UploadResult {
    /// Build a failed result.
    pub fn failure(error: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            error: Some(error.into()),
            status_code,
            ..Self::default()
        }
    }

    /// Returns true if the upload produced a permalink.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if the final failure was a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(429)
    }
}
