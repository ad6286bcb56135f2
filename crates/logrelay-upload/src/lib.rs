//! Upload and detail retrieval for the remote analysis service.
//!
//! [`UploadQueue`] submits log files with bounded concurrency, retries and
//! queue-wide pacing. [`DetailFetcher`] retrieves the detailed document for
//! an uploaded log, sharing in-flight requests and remembering failures.
//! [`ReportClient`] is the HTTP implementation of both service seams.

pub mod client;
pub mod config;
pub mod detail;
pub mod error;
pub mod queue;
pub mod retry;

pub use client::{DetailResponse, DetailSource, ReportClient, UploadResponse, UploadTransport};
pub use config::{DetailFetchConfig, UploadQueueConfig, DEFAULT_DETAIL_BASE, DEFAULT_UPLOAD_ENDPOINTS};
pub use detail::{resource_id, DetailErrorKind, DetailFailure, DetailFetcher, DetailOutcome};
pub use error::TransportError;
pub use queue::{QueueStats, UploadQueue};
pub use retry::{backoff_delay, parse_retry_after};
