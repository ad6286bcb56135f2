//! Bounded-concurrency upload queue.
//!
//! A dispatcher task owns the pending list and the set of running uploads.
//! Each upload retries on its own schedule; when it finishes, the dispatcher
//! may hold back the next dequeue so that a failing or rate-limited service
//! is not hit again immediately by the rest of the queue.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logrelay_core::UploadResult;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::UploadTransport;
use crate::config::UploadQueueConfig;
use crate::error::TransportError;
use crate::retry::backoff_delay;

/// Snapshot of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub in_flight: usize,
}

enum Command {
    Upload {
        file: PathBuf,
        reply: oneshot::Sender<UploadResult>,
    },
    Stats(oneshot::Sender<QueueStats>),
}

struct Pending {
    file: PathBuf,
    reply: oneshot::Sender<UploadResult>,
}

/// Handle to the upload dispatcher.
#[derive(Clone)]
pub struct UploadQueue {
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<UploadQueueConfig>,
}

impl UploadQueue {
    /// Start a dispatcher. Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn UploadTransport>, config: UploadQueueConfig) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            transport,
            config: config.clone(),
            pending: VecDeque::new(),
            running: JoinSet::new(),
            next_dequeue_at: Instant::now(),
        };
        tokio::spawn(dispatcher.run(rx));
        Self {
            commands: tx,
            config,
        }
    }

    pub fn config(&self) -> &UploadQueueConfig {
        &self.config
    }

    /// Queue a file and wait for its terminal outcome.
    ///
    /// Never fails: transport problems come back as a failed [`UploadResult`].
    pub async fn upload(&self, file: impl Into<PathBuf>) -> UploadResult {
        let (reply, rx) = oneshot::channel();
        let command = Command::Upload {
            file: file.into(),
            reply,
        };
        if self.commands.send(command).is_err() {
            return UploadResult::failure("upload queue is not running", None);
        }
        rx.await
            .unwrap_or_else(|_| UploadResult::failure("upload task ended without a result", None))
    }

    pub async fn stats(&self) -> QueueStats {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stats(tx)).is_err() {
            return QueueStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

struct Dispatcher {
    transport: Arc<dyn UploadTransport>,
    config: Arc<UploadQueueConfig>,
    pending: VecDeque<Pending>,
    running: JoinSet<Duration>,
    next_dequeue_at: Instant,
}

impl Dispatcher {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            self.start_ready();

            let waiting_on_pacing = !self.pending.is_empty() && self.has_capacity();
            let wake_at = self.next_dequeue_at;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(joined) = self.running.join_next(), if !self.running.is_empty() => {
                    let pause = joined.unwrap_or_else(|e| {
                        warn!(error = %e, "Upload task failed");
                        self.config.error_delay
                    });
                    self.pace(pause);
                }
                _ = tokio::time::sleep_until(wake_at), if waiting_on_pacing => {}
            }
        }
        debug!("Upload dispatcher stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Upload { file, reply } => {
                debug!(file = %file.display(), queued = self.pending.len() + 1, "Upload queued");
                self.pending.push_back(Pending { file, reply });
            }
            Command::Stats(reply) => {
                let _ = reply.send(QueueStats {
                    queued: self.pending.len(),
                    in_flight: self.running.len(),
                });
            }
        }
    }

    fn has_capacity(&self) -> bool {
        self.running.len() < self.config.concurrency.max(1)
    }

    fn start_ready(&mut self) {
        while self.has_capacity() && Instant::now() >= self.next_dequeue_at {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            let transport = self.transport.clone();
            let config = self.config.clone();
            self.running.spawn(async move {
                let result = upload_with_retry(transport.as_ref(), &config, &next.file).await;
                let pause = pacing_after(&config, &result);
                let _ = next.reply.send(result);
                pause
            });
        }
    }

    fn pace(&mut self, pause: Duration) {
        if pause.is_zero() {
            return;
        }
        info!(delay_ms = pause.as_millis() as u64, "Pausing upload queue");
        self.next_dequeue_at = self.next_dequeue_at.max(Instant::now() + pause);
    }
}

/// Delay imposed on the whole queue after one upload finishes.
fn pacing_after(config: &UploadQueueConfig, result: &UploadResult) -> Duration {
    if result.is_success() {
        Duration::ZERO
    } else if result.is_rate_limited() {
        config.rate_limit_cooldown
    } else if config.auth_token.is_some() {
        config.error_delay_with_token
    } else {
        config.error_delay
    }
}

/// Delay before the attempt following `attempt`.
fn retry_delay(config: &UploadQueueConfig, attempt: u32, err: &TransportError) -> Duration {
    if err.is_rate_limited() {
        return config
            .rate_limit_cooldown
            .max(err.retry_after.unwrap_or(Duration::ZERO));
    }
    err.retry_after
        .unwrap_or_else(|| backoff_delay(attempt, config.base_backoff, config.max_backoff))
}

async fn upload_with_retry(
    transport: &dyn UploadTransport,
    config: &UploadQueueConfig,
    file: &Path,
) -> UploadResult {
    if config.endpoints.is_empty() {
        return UploadResult::failure("no upload endpoints configured", None);
    }
    let max_attempts = config.max_attempts.max(1);
    let token = config.auth_token.as_deref();
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let endpoint = &config.endpoints[(attempt as usize - 1) % config.endpoints.len()];
        debug!(file = %file.display(), endpoint = %endpoint, attempt, max_attempts, "Uploading");

        match transport.submit(endpoint, file, token).await {
            Ok(response) => {
                info!(file = %file.display(), permalink = %response.permalink, attempt, "Upload complete");
                return response.into_result(Utc::now());
            }
            Err(err) => {
                warn!(
                    file = %file.display(),
                    attempt,
                    status = ?err.status,
                    error = %err,
                    "Upload attempt failed"
                );
                if attempt < max_attempts {
                    let delay = retry_delay(config, attempt, &err);
                    debug!(delay_ms = delay.as_millis() as u64, "Retrying upload");
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) => UploadResult::failure(err.message, err.status),
        None => UploadResult::failure("upload failed", None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::UploadResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = dyn Fn(&str, usize) -> Result<UploadResponse, TransportError> + Send + Sync;

    struct Call {
        file: String,
        endpoint: String,
        at: Instant,
    }

    struct FakeTransport {
        script: Box<Script>,
        latency: Duration,
        calls: Mutex<Vec<Call>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeTransport {
        fn new(
            latency: Duration,
            script: impl Fn(&str, usize) -> Result<UploadResponse, TransportError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                latency,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls_for(&self, file: &str) -> Vec<(String, Instant)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.file == file)
                .map(|c| (c.endpoint.clone(), c.at))
                .collect()
        }
    }

    #[async_trait]
    impl UploadTransport for FakeTransport {
        async fn submit(
            &self,
            endpoint: &str,
            file: &Path,
            _auth_token: Option<&str>,
        ) -> Result<UploadResponse, TransportError> {
            let name = file.display().to_string();
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let attempt = calls.iter().filter(|c| c.file == name).count();
                calls.push(Call {
                    file: name.clone(),
                    endpoint: endpoint.to_string(),
                    at: Instant::now(),
                });
                attempt
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.script)(&name, attempt)
        }
    }

    fn ok(file: &str) -> Result<UploadResponse, TransportError> {
        Ok(UploadResponse {
            id: file.to_string(),
            permalink: format!("https://dps.report/{}", file),
            upload_time: Some(1),
            ..UploadResponse::default()
        })
    }

    fn config() -> UploadQueueConfig {
        UploadQueueConfig {
            endpoints: vec!["primary".to_string(), "backup".to_string()],
            ..UploadQueueConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling() {
        let transport = FakeTransport::new(Duration::from_secs(1), |file, _| ok(file));
        let queue = UploadQueue::new(transport.clone(), config());

        let mut uploads = JoinSet::new();
        for i in 0..5 {
            let queue = queue.clone();
            uploads.spawn(async move { queue.upload(format!("log{}.zevtc", i)).await });
        }
        while let Some(result) = uploads.join_next().await {
            assert!(result.unwrap().is_success());
        }

        assert_eq!(transport.calls.lock().unwrap().len(), 5);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_forces_cooldown_and_endpoints_alternate() {
        let transport = FakeTransport::new(Duration::ZERO, |file, attempt| match attempt {
            0 => Err(TransportError::status(500, "HTTP 500")),
            1 => Err(TransportError::status(429, "HTTP 429")),
            _ => ok(file),
        });
        let queue = UploadQueue::new(transport.clone(), config());

        let result = queue.upload("a.zevtc").await;
        assert!(result.is_success());

        let calls = transport.calls_for("a.zevtc");
        let endpoints: Vec<&str> = calls.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(endpoints, vec!["primary", "backup", "primary"]);
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(1));
        assert!(calls[2].1 - calls[1].1 >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = FakeTransport::new(Duration::ZERO, |_, _| {
            Err(TransportError::status(502, "HTTP 502 Bad Gateway"))
        });
        let queue = UploadQueue::new(transport.clone(), config());

        let result = queue.upload("a.zevtc").await;
        assert!(!result.is_success());
        assert_eq!(result.status_code, Some(502));
        assert_eq!(result.error.as_deref(), Some("HTTP 502 Bad Gateway"));
        assert_eq!(transport.calls_for("a.zevtc").len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_backoff() {
        let transport = FakeTransport::new(Duration::ZERO, |file, attempt| {
            if attempt == 0 {
                Err(TransportError::status(503, "HTTP 503")
                    .with_retry_after(Some(Duration::from_secs(7))))
            } else {
                ok(file)
            }
        });
        let queue = UploadQueue::new(transport.clone(), config());

        assert!(queue.upload("a.zevtc").await.is_success());
        let calls = transport.calls_for("a.zevtc");
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_task_pauses_whole_queue() {
        let transport = FakeTransport::new(Duration::ZERO, |file, _| {
            if file == "first.zevtc" {
                Err(TransportError::status(429, "HTTP 429"))
            } else {
                ok(file)
            }
        });
        let queue = UploadQueue::new(
            transport.clone(),
            UploadQueueConfig {
                concurrency: 1,
                max_attempts: 1,
                ..config()
            },
        );

        let (first, second) = tokio::join!(queue.upload("first.zevtc"), queue.upload("second.zevtc"));
        assert!(first.is_rate_limited());
        assert!(second.is_success());

        let gap = transport.calls_for("second.zevtc")[0].1 - transport.calls_for("first.zevtc")[0].1;
        assert!(gap >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_pacing_is_shorter_with_token() {
        let transport = FakeTransport::new(Duration::ZERO, |file, _| {
            if file == "first.zevtc" {
                Err(TransportError::network("connection reset"))
            } else {
                ok(file)
            }
        });
        let queue = UploadQueue::new(
            transport.clone(),
            UploadQueueConfig {
                concurrency: 1,
                max_attempts: 1,
                ..config()
            }
            .with_auth_token("secret"),
        );

        let (first, second) = tokio::join!(queue.upload("first.zevtc"), queue.upload("second.zevtc"));
        assert_eq!(first.status_code, None);
        assert!(second.is_success());

        let gap = transport.calls_for("second.zevtc")[0].1 - transport.calls_for("first.zevtc")[0].1;
        assert!(gap >= Duration::from_secs(5));
        assert!(gap < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_does_not_pause_queue() {
        let transport = FakeTransport::new(Duration::ZERO, |file, _| ok(file));
        let queue = UploadQueue::new(
            transport.clone(),
            UploadQueueConfig {
                concurrency: 1,
                ..config()
            },
        );

        let (first, second) = tokio::join!(queue.upload("first.zevtc"), queue.upload("second.zevtc"));
        assert!(first.is_success() && second.is_success());

        let gap = transport.calls_for("second.zevtc")[0].1 - transport.calls_for("first.zevtc")[0].1;
        assert_eq!(gap, Duration::ZERO);
        assert_eq!(queue.stats().await.queued, 0);
    }

    #[test]
    fn test_retry_delay_rules() {
        let config = config();
        let plain = TransportError::network("timeout");
        assert_eq!(retry_delay(&config, 3, &plain), Duration::from_secs(4));

        let limited = TransportError::status(429, "slow down");
        assert_eq!(retry_delay(&config, 1, &limited), Duration::from_secs(60));

        let limited_long = limited.with_retry_after(Some(Duration::from_secs(90)));
        assert_eq!(retry_delay(&config, 1, &limited_long), Duration::from_secs(90));
    }
}
