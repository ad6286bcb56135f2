//! logrelay Core Domain Types
//!
//! This crate contains pure domain types and pure computations with no
//! dependencies on:
//! - Network/HTTP
//! - Async runtimes
//! - Process management
//!
//! The job functions here (`hash_file`, `parse_document`, `compute_metrics`)
//! are the single implementation shared by pool workers and by the
//! in-process fallback path.

pub mod error;
pub mod ids;
pub mod jobs;
pub mod metrics;
pub mod protocol;
pub mod result;
pub mod settings;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{TaskId, WorkerId};
pub use jobs::{hash_file, is_gzip_path, parse_document, parse_json_bytes};
pub use metrics::{compute_metrics, MetricsInput, MetricsResult};
pub use protocol::{ExternalToolRequest, WorkerRequest, WorkerResponse};
pub use result::{ExternalToolResult, Runtime, ToolSource, UploadResult};
pub use settings::{ExternalToolSettings, RuntimePreference};
