//! Error types for the external analysis tool.

use thiserror::Error;

/// Errors that can occur while installing or running the external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool is missing and installation is not permitted.
    #[error("Analysis tool not found and auto-setup is disabled.")]
    NotInstalled,

    /// No runtime variant can execute the installed artifacts.
    #[error("No compatible runtime found (managed launcher and compat layer missing).")]
    NoRuntime,

    /// The release descriptor does not list the expected asset.
    #[error("Failed to locate {0} in the latest release.")]
    AssetMissing(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Release archive could not be extracted.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Launcher install script failed.
    #[error("Managed runtime install failed: {0}")]
    LauncherInstall(String),

    /// Tool process exited with an error.
    #[error("{0}")]
    ProcessError(String),

    /// Tool finished without producing a document.
    #[error("Analysis tool finished but no JSON output was found.")]
    NoOutput,

    /// Output document could not be read.
    #[error("Failed to read output: {0}")]
    Document(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<logrelay_core::CoreError> for ToolError {
    fn from(err: logrelay_core::CoreError) -> Self {
        Self::Document(err.to_string())
    }
}
