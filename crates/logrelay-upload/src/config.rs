//! Upload queue and detail fetch configuration.

use std::time::Duration;

/// Primary and backup upload endpoints of the analysis service.
pub const DEFAULT_UPLOAD_ENDPOINTS: [&str; 2] = [
    "https://dps.report/uploadContent",
    "https://b.dps.report/uploadContent",
];

/// Base URL for detail retrieval.
pub const DEFAULT_DETAIL_BASE: &str = "https://dps.report";

/// Upload queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadQueueConfig {
    /// Uploads allowed in flight at once.
    pub concurrency: usize,

    /// Attempts per file before giving up.
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt.
    pub base_backoff: Duration,

    /// Upper bound for the exponential retry delay.
    pub max_backoff: Duration,

    /// Minimum wait after a rate-limit response, for retries and for the queue.
    pub rate_limit_cooldown: Duration,

    /// Queue pause after a file fails for any other reason.
    pub error_delay: Duration,

    /// Queue pause after a failure when an auth token is configured.
    pub error_delay_with_token: Duration,

    /// Endpoints tried in rotation, primary first.
    pub endpoints: Vec<String>,

    /// User token sent with every upload.
    pub auth_token: Option<String>,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
            error_delay: Duration::from_secs(15),
            error_delay_with_token: Duration::from_secs(5),
            endpoints: DEFAULT_UPLOAD_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            auth_token: None,
        }
    }
}

impl UploadQueueConfig {
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Detail fetch settings.
///
/// The retry constants are defaults, not protocol requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailFetchConfig {
    /// Attempts per resource before the failure becomes terminal.
    pub max_attempts: u32,

    /// First delay between attempts; doubles per attempt.
    pub base_backoff: Duration,

    /// Upper bound for the delay between attempts.
    pub max_backoff: Duration,

    /// Marker preceding a JSON document embedded in a larger payload.
    pub start_sentinel: String,

    /// Marker following the embedded document.
    pub end_sentinel: String,
}

impl Default for DetailFetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            start_sentinel: "var _logData = ".to_string(),
            end_sentinel: ";\n".to_string(),
        }
    }
}
