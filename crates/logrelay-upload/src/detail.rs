//! Detail fetch coordinator.
//!
//! Concurrent requests for the same resource share one in-flight fetch.
//! Malformed responses are retried a bounded number of times; a resource
//! that still fails is remembered and answered from memory afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::client::{DetailResponse, DetailSource};
use crate::config::DetailFetchConfig;
use crate::retry::backoff_delay;

/// Why a detail fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailErrorKind {
    /// The body ended before the document was complete.
    IncompleteJson,
    /// The body is not a JSON document.
    InvalidJson,
    /// The service answered with an explicit error.
    ServiceError,
    /// Network failure or an unusable HTTP status.
    RequestFailed,
}

impl DetailErrorKind {
    /// Malformed bodies and network failures may clear up on a later attempt.
    fn is_retryable(self) -> bool {
        !matches!(self, Self::ServiceError)
    }

    /// Failures that are remembered once retries are exhausted.
    fn is_cacheable(self) -> bool {
        !matches!(self, Self::RequestFailed)
    }
}

impl fmt::Display for DetailErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IncompleteJson => "incomplete-json",
            Self::InvalidJson => "invalid-json",
            Self::ServiceError => "service-error",
            Self::RequestFailed => "request-failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailFailure {
    #[serde(rename = "error")]
    pub kind: DetailErrorKind,
    pub message: String,
    /// Answered from the failure cache without a network call.
    pub cached: bool,
}

impl DetailFailure {
    fn new(kind: DetailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cached: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Found(Arc<Value>),
    Failed(DetailFailure),
}

impl DetailOutcome {
    pub fn document(&self) -> Option<&Value> {
        match self {
            Self::Found(doc) => Some(doc),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DetailFailure> {
        match self {
            Self::Found(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

enum Entry {
    InFlight(Arc<OnceCell<DetailOutcome>>),
    Terminal(DetailFailure),
}

/// Deduplicating, failure-caching fetcher for detail documents.
pub struct DetailFetcher {
    source: Arc<dyn DetailSource>,
    config: DetailFetchConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl DetailFetcher {
    pub fn new(source: Arc<dyn DetailSource>, config: DetailFetchConfig) -> Self {
        Self {
            source,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DetailFetchConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch the detail document for a permalink or bare resource id.
    pub async fn fetch_detail(&self, permalink_or_id: &str) -> DetailOutcome {
        let id = resource_id(permalink_or_id);
        if id.is_empty() {
            return DetailOutcome::Failed(DetailFailure::new(
                DetailErrorKind::RequestFailed,
                "empty resource id",
            ));
        }

        let cell = {
            let mut entries = self.entries();
            match entries.get(id) {
                Some(Entry::Terminal(failure)) => {
                    debug!(id = %id, kind = %failure.kind, "Detail failure served from cache");
                    return DetailOutcome::Failed(DetailFailure {
                        cached: true,
                        ..failure.clone()
                    });
                }
                Some(Entry::InFlight(cell)) => cell.clone(),
                None => {
                    let cell = Arc::new(OnceCell::new());
                    entries.insert(id.to_string(), Entry::InFlight(cell.clone()));
                    cell
                }
            }
        };

        let outcome = cell.get_or_init(|| self.fetch_with_retry(id)).await.clone();
        self.settle(id, &cell, &outcome);
        outcome
    }

    /// Forget cached failures and detach in-flight fetches.
    pub fn reset(&self) {
        self.entries().clear();
    }

    /// Replace the in-flight entry with its terminal state, once.
    fn settle(&self, id: &str, cell: &Arc<OnceCell<DetailOutcome>>, outcome: &DetailOutcome) {
        let mut entries = self.entries();
        let current = matches!(entries.get(id), Some(Entry::InFlight(c)) if Arc::ptr_eq(c, cell));
        if !current {
            return;
        }
        match outcome {
            DetailOutcome::Failed(failure) if failure.kind.is_cacheable() => {
                entries.insert(id.to_string(), Entry::Terminal(failure.clone()));
            }
            _ => {
                entries.remove(id);
            }
        }
    }

    async fn fetch_with_retry(&self, id: &str) -> DetailOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let failure = match self.source.get(id).await {
                Ok(response) => match self.classify(&response) {
                    Ok(doc) => {
                        info!(id = %id, attempt, "Detail fetched");
                        return DetailOutcome::Found(Arc::new(doc));
                    }
                    Err(failure) => failure,
                },
                Err(err) => DetailFailure::new(DetailErrorKind::RequestFailed, err.message),
            };

            warn!(id = %id, attempt, kind = %failure.kind, error = %failure.message, "Detail fetch failed");
            if !failure.kind.is_retryable() || attempt >= max_attempts {
                return DetailOutcome::Failed(failure);
            }
            let delay = backoff_delay(attempt, self.config.base_backoff, self.config.max_backoff);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn classify(&self, response: &DetailResponse) -> Result<Value, DetailFailure> {
        let parsed = classify_body(
            &response.body,
            &self.config.start_sentinel,
            &self.config.end_sentinel,
        );
        let success = (200..300).contains(&response.status);
        match parsed {
            Ok(doc) if success => Ok(doc),
            Err(failure) if success || failure.kind == DetailErrorKind::ServiceError => Err(failure),
            _ => Err(DetailFailure::new(
                DetailErrorKind::RequestFailed,
                format!("HTTP {}", response.status),
            )),
        }
    }
}

/// The trailing path segment of a permalink, or the input itself.
pub fn resource_id(permalink_or_id: &str) -> &str {
    permalink_or_id
        .trim()
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
}

/// Locate the JSON document within a response body.
///
/// Bare documents are used as is; otherwise the text between the sentinels
/// is taken, without its trailing statement terminator.
pub fn extract_json<'a>(body: &'a str, start_sentinel: &str, end_sentinel: &str) -> &'a str {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    let Some(start) = body.find(start_sentinel) else {
        return trimmed;
    };
    let rest = &body[start + start_sentinel.len()..];
    let embedded = match rest.find(end_sentinel) {
        Some(end) if !end_sentinel.is_empty() => &rest[..end],
        _ => rest,
    };
    embedded.trim().trim_end_matches(';').trim_end()
}

fn classify_body(body: &str, start_sentinel: &str, end_sentinel: &str) -> Result<Value, DetailFailure> {
    let json = extract_json(body, start_sentinel, end_sentinel);
    let doc: Value = serde_json::from_str(json).map_err(|e| {
        let kind = if e.is_eof() {
            DetailErrorKind::IncompleteJson
        } else {
            DetailErrorKind::InvalidJson
        };
        DetailFailure::new(kind, e.to_string())
    })?;

    match doc.get("error") {
        None | Some(Value::Null) => Ok(doc),
        Some(Value::String(message)) => Err(DetailFailure::new(DetailErrorKind::ServiceError, message.clone())),
        Some(other) => Err(DetailFailure::new(DetailErrorKind::ServiceError, other.to_string())),
    }
}
