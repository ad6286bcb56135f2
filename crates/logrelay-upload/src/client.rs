//! HTTP client for the remote analysis service.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logrelay_core::UploadResult;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_DETAIL_BASE;
use crate::error::TransportError;
use crate::retry::parse_retry_after;

/// Engine identifier sent with every upload.
pub const GENERATOR: &str = "ei";

/// Per-request timeout for uploads.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-request timeout for detail retrieval.
pub const DETAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// One upload attempt against one endpoint.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn submit(
        &self,
        endpoint: &str,
        file: &Path,
        auth_token: Option<&str>,
    ) -> Result<UploadResponse, TransportError>;
}

/// One detail retrieval for a resource id.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn get(&self, id: &str) -> Result<DetailResponse, TransportError>;
}

/// Raw answer from the detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailResponse {
    pub status: u16,
    pub body: String,
}

/// Upload endpoint response body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub upload_time: Option<i64>,
    #[serde(default)]
    pub encounter: Option<Encounter>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Encounter {
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub boss: Option<String>,
}

impl UploadResponse {
    /// Map onto the caller-facing result; a missing upload time becomes `now`.
    pub fn into_result(self, now: DateTime<Utc>) -> UploadResult {
        let encounter = self.encounter.unwrap_or_default();
        UploadResult {
            id: self.id,
            permalink: self.permalink,
            user_token: self.user_token,
            upload_time: Some(self.upload_time.unwrap_or_else(|| now.timestamp())),
            encounter_duration: encounter.duration,
            fight_name: encounter.boss,
            error: None,
            status_code: None,
        }
    }

    fn service_error(&self) -> Option<String> {
        match &self.error {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// `reqwest` implementation of both service seams.
#[derive(Debug, Clone)]
pub struct ReportClient {
    inner: reqwest::Client,
    detail_base: String,
    detail_timeout: Duration,
}

impl Default for ReportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportClient {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            detail_base: DEFAULT_DETAIL_BASE.to_string(),
            detail_timeout: DETAIL_TIMEOUT,
        }
    }

    /// Point detail retrieval at another host.
    pub fn with_detail_base(mut self, base_url: &str) -> Self {
        self.detail_base = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_detail_timeout(mut self, timeout: Duration) -> Self {
        self.detail_timeout = timeout;
        self
    }
}

#[async_trait]
impl UploadTransport for ReportClient {
    async fn submit(
        &self,
        endpoint: &str,
        file: &Path,
        auth_token: Option<&str>,
    ) -> Result<UploadResponse, TransportError> {
        let local_err = |e: std::io::Error| TransportError::network(format!("{}: {}", file.display(), e));
        let handle = tokio::fs::File::open(file).await.map_err(local_err)?;
        let length = handle.metadata().await.map_err(local_err)?.len();
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log.zevtc".to_string());

        let mut form = Form::new()
            .text("json", "1")
            .text("generator", GENERATOR)
            .text("detailedwvw", "true");
        if let Some(token) = auth_token {
            form = form.text("userToken", token.to_string());
        }
        // Streamed from disk, never buffered whole.
        let part = Part::stream_with_length(reqwest::Body::from(handle), length).file_name(file_name);
        form = form.part("file", part);

        debug!(endpoint = %endpoint, file = %file.display(), "POST upload");

        let response = self
            .inner
            .post(endpoint)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        if !status.is_success() {
            return Err(TransportError::status(status.as_u16(), format!("HTTP {}", status))
                .with_retry_after(retry_after));
        }

        let body: UploadResponse = response.json().await?;
        if let Some(message) = body.service_error() {
            return Err(TransportError::network(message));
        }
        Ok(body)
    }
}

#[async_trait]
impl DetailSource for ReportClient {
    async fn get(&self, id: &str) -> Result<DetailResponse, TransportError> {
        let url = format!("{}/getJson", self.detail_base);
        debug!(url = %url, id = %id, "GET detail");

        let response = self
            .inner
            .get(&url)
            .timeout(self.detail_timeout)
            .query(&[("permalink", id)])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(DetailResponse { status, body })
    }
}
