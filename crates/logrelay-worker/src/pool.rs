//! Generic worker pool for CPU-bound jobs.
//!
//! A coordinator task owns every piece of bookkeeping (task queue, worker
//! table, timers) and exchanges protocol messages with worker threads over
//! channels. Workers never touch coordinator state.
//!
//! The public operations never surface worker problems: when the worker
//! path fails, the same pure job runs inline on the blocking pool.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use logrelay_core::{
    compute_metrics, hash_file, parse_document, CoreError, MetricsInput, MetricsResult, TaskId,
    WorkerId, WorkerRequest, WorkerResponse,
};
use logrelay_external::DocumentReader;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::error::PoolError;

/// Function a worker thread runs for every request.
pub(crate) type JobHandler = Arc<dyn Fn(WorkerRequest) -> WorkerResponse + Send + Sync>;

type Reply = oneshot::Sender<Result<WorkerResponse, PoolError>>;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_workers: usize,
    /// Threads abandoned on timeout that have not exited yet.
    pub detached_workers: usize,
}

/// Default job handler: dispatch a request to the shared pure functions.
pub fn execute_request(request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::Hash { id, file_path } => match hash_file(&file_path) {
            Ok(hash) => WorkerResponse::HashResult { id, hash },
            Err(e) => WorkerResponse::error(id, e),
        },
        WorkerRequest::JsonParse {
            id,
            file_path,
            is_gzipped,
        } => match parse_document(&file_path, is_gzipped) {
            Ok(data) => WorkerResponse::JsonParseResult { id, data },
            Err(e) => WorkerResponse::error(id, e),
        },
        WorkerRequest::Metrics { id, payload } => WorkerResponse::MetricsResult {
            id,
            result: Box::new(compute_metrics(&payload)),
        },
        WorkerRequest::RunExternal { id, .. } => {
            WorkerResponse::error(id, "external tool runs belong to the tool worker")
        }
        WorkerRequest::Shutdown => WorkerResponse::ShutdownAck,
    }
}

enum Command {
    Submit { request: WorkerRequest, reply: Reply },
    WaitReady(oneshot::Sender<()>),
    Stats(oneshot::Sender<PoolStats>),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Message {
        worker_id: WorkerId,
        response: WorkerResponse,
    },
    Exited {
        worker_id: WorkerId,
        panicked: bool,
    },
    TaskTimeout {
        worker_id: WorkerId,
        task_id: TaskId,
    },
    IdleExpired {
        worker_id: WorkerId,
        epoch: u64,
    },
    ShutdownDeadline,
}

struct Task {
    id: TaskId,
    request: WorkerRequest,
    reply: Reply,
    enqueued_at: Instant,
}

struct Assigned {
    id: TaskId,
    kind: &'static str,
    reply: Reply,
    started_at: Instant,
    timer: JoinHandle<()>,
}

struct ManagedWorker {
    requests: std_mpsc::Sender<WorkerRequest>,
    ready: bool,
    current: Option<Assigned>,
    idle_timer: Option<JoinHandle<()>>,
    idle_epoch: u64,
}

impl ManagedWorker {
    fn new(requests: std_mpsc::Sender<WorkerRequest>) -> Self {
        Self {
            requests,
            ready: false,
            current: None,
            idle_timer: None,
            idle_epoch: 0,
        }
    }

    fn busy(&self) -> bool {
        self.current.is_some()
    }

    fn clear_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

fn schedule(events: &mpsc::UnboundedSender<Event>, after: Duration, event: Event) -> JoinHandle<()> {
    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = events.send(event);
    })
}

/// Reports the thread's exit, including unwinding from a panic.
struct ExitNotice {
    worker_id: WorkerId,
    events: mpsc::UnboundedSender<Event>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Exited {
            worker_id: self.worker_id,
            panicked: std::thread::panicking(),
        });
    }
}

fn worker_loop(
    worker_id: WorkerId,
    requests: std_mpsc::Receiver<WorkerRequest>,
    events: mpsc::UnboundedSender<Event>,
    handler: JobHandler,
) {
    let _notice = ExitNotice {
        worker_id,
        events: events.clone(),
    };
    let send = |response| events.send(Event::Message { worker_id, response }).is_ok();

    if !send(WorkerResponse::Ready) {
        return;
    }
    while let Ok(request) = requests.recv() {
        if matches!(request, WorkerRequest::Shutdown) {
            send(WorkerResponse::ShutdownAck);
            break;
        }
        if !send(handler(request)) {
            break;
        }
    }
}

struct Coordinator {
    config: WorkerPoolConfig,
    handler: JobHandler,
    events_tx: mpsc::UnboundedSender<Event>,
    workers: BTreeMap<WorkerId, ManagedWorker>,
    detached: HashSet<WorkerId>,
    queue: VecDeque<Task>,
    next_worker_id: u64,
    ready_waiters: Vec<oneshot::Sender<()>>,
    shutting_down: bool,
    awaiting_ack: HashSet<WorkerId>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Coordinator {
    fn new(
        config: WorkerPoolConfig,
        handler: JobHandler,
        events_tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            config,
            handler,
            events_tx,
            workers: BTreeMap::new(),
            detached: HashSet::new(),
            queue: VecDeque::new(),
            next_worker_id: 0,
            ready_waiters: Vec::new(),
            shutting_down: false,
            awaiting_ack: HashSet::new(),
            shutdown_waiters: Vec::new(),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.replenish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        for worker in self.workers.values_mut() {
            worker.clear_idle_timer();
            if let Some(assigned) = worker.current.take() {
                assigned.timer.abort();
            }
        }
        debug!("Worker pool coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { request, reply } => {
                if self.shutting_down {
                    let _ = reply.send(Err(PoolError::ShuttingDown));
                    return;
                }
                let Some(id) = request.id().cloned() else {
                    let _ = reply.send(Err(PoolError::Task("request carries no task id".into())));
                    return;
                };
                self.queue.push_back(Task {
                    id,
                    request,
                    reply,
                    enqueued_at: Instant::now(),
                });
                self.process_queue();
            }
            Command::WaitReady(reply) => {
                self.ready_waiters.push(reply);
                self.notify_ready();
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown(reply) => self.begin_shutdown(reply),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message {
                worker_id,
                response: WorkerResponse::Ready,
            } => {
                if let Some(worker) = self.workers.get_mut(&worker_id) {
                    worker.ready = true;
                    debug!(worker_id = %worker_id, "Worker ready");
                }
                self.notify_ready();
                self.process_queue();
                self.schedule_idle(worker_id);
            }
            Event::Message {
                worker_id,
                response: WorkerResponse::ShutdownAck,
            } => self.acknowledge(worker_id),
            Event::Message {
                worker_id,
                response,
            } => self.complete(worker_id, response),
            Event::Exited {
                worker_id,
                panicked,
            } => self.worker_exited(worker_id, panicked),
            Event::TaskTimeout { worker_id, task_id } => self.task_timed_out(worker_id, task_id),
            Event::IdleExpired { worker_id, epoch } => self.retire_idle(worker_id, epoch),
            Event::ShutdownDeadline => {
                if self.shutting_down {
                    self.finish_shutdown();
                }
            }
        }
    }

    fn spawn_worker(&mut self) -> bool {
        self.next_worker_id += 1;
        let worker_id = WorkerId::new(self.next_worker_id);
        let (requests_tx, requests_rx) = std_mpsc::channel();
        let events = self.events_tx.clone();
        let handler = self.handler.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("logrelay-{}", worker_id))
            .spawn(move || worker_loop(worker_id, requests_rx, events, handler));
        match spawned {
            Ok(_) => {
                debug!(worker_id = %worker_id, "Spawned worker");
                self.workers
                    .insert(worker_id, ManagedWorker::new(requests_tx));
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn worker thread");
                false
            }
        }
    }

    fn replenish(&mut self) {
        while !self.shutting_down && self.workers.len() < self.config.min_workers {
            if !self.spawn_worker() {
                break;
            }
        }
    }

    fn idle_worker(&self) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|(_, w)| w.ready && !w.busy())
            .map(|(id, _)| *id)
    }

    fn starting_workers(&self) -> usize {
        self.workers.values().filter(|w| !w.ready).count()
    }

    fn process_queue(&mut self) {
        if self.shutting_down {
            return;
        }

        while !self.queue.is_empty() {
            let Some(worker_id) = self.idle_worker() else {
                break;
            };
            if let Some(task) = self.queue.pop_front() {
                self.dispatch(worker_id, task);
            }
        }

        // Grow toward the backlog; workers still starting count as capacity
        // and detached threads still occupy a slot.
        while !self.queue.is_empty()
            && self.workers.len() + self.detached.len() < self.config.max_workers
            && self.starting_workers() < self.queue.len()
        {
            if !self.spawn_worker() {
                break;
            }
        }

        if !self.queue.is_empty() && self.workers.is_empty() {
            warn!(queued = self.queue.len(), "No workers available, rejecting queued tasks");
            for task in self.queue.drain(..) {
                let _ = task
                    .reply
                    .send(Err(PoolError::Spawn("no worker could be started".into())));
            }
        }
    }

    fn dispatch(&mut self, worker_id: WorkerId, task: Task) {
        let Some(worker) = self.workers.get_mut(&worker_id) else {
            self.queue.push_front(task);
            return;
        };

        let Task {
            id,
            request,
            reply,
            enqueued_at,
        } = task;
        let kind = request.kind();
        if let Err(std_mpsc::SendError(request)) = worker.requests.send(request) {
            warn!(worker_id = %worker_id, task_id = %id, "Worker channel closed, requeueing task");
            self.workers.remove(&worker_id);
            self.queue.push_front(Task {
                id,
                request,
                reply,
                enqueued_at,
            });
            return;
        }

        worker.clear_idle_timer();
        let timer = schedule(
            &self.events_tx,
            self.config.task_timeout,
            Event::TaskTimeout {
                worker_id,
                task_id: id.clone(),
            },
        );
        debug!(
            task_id = %id,
            worker_id = %worker_id,
            kind,
            queued_ms = enqueued_at.elapsed().as_millis() as u64,
            "Dispatched task"
        );
        worker.current = Some(Assigned {
            id,
            kind,
            reply,
            started_at: Instant::now(),
            timer,
        });
    }

    fn complete(&mut self, worker_id: WorkerId, response: WorkerResponse) {
        let Some(worker) = self.workers.get_mut(&worker_id) else {
            debug!(worker_id = %worker_id, "Ignoring response from retired worker");
            return;
        };
        let matches = worker
            .current
            .as_ref()
            .is_some_and(|assigned| Some(&assigned.id) == response.id());
        if !matches {
            warn!(worker_id = %worker_id, task_id = ?response.id(), "Response for unknown task");
            return;
        }
        let Some(assigned) = worker.current.take() else {
            return;
        };
        assigned.timer.abort();

        debug!(
            task_id = %assigned.id,
            worker_id = %worker_id,
            kind = assigned.kind,
            elapsed_ms = assigned.started_at.elapsed().as_millis() as u64,
            "Task completed"
        );
        let result = match response {
            WorkerResponse::Error { error, .. } => Err(PoolError::Task(error)),
            other => Ok(other),
        };
        let _ = assigned.reply.send(result);

        self.process_queue();
        self.schedule_idle(worker_id);
    }

    fn worker_exited(&mut self, worker_id: WorkerId, panicked: bool) {
        if self.detached.remove(&worker_id) {
            debug!(worker_id = %worker_id, "Detached worker finished");
        }
        if let Some(mut worker) = self.workers.remove(&worker_id) {
            worker.clear_idle_timer();
            if let Some(assigned) = worker.current.take() {
                assigned.timer.abort();
                let message = if panicked {
                    "worker panicked"
                } else {
                    "worker exited"
                };
                warn!(worker_id = %worker_id, task_id = %assigned.id, message, "Rejecting task of failed worker");
                let _ = assigned.reply.send(Err(PoolError::WorkerFault {
                    worker_id,
                    message: message.to_string(),
                }));
            } else if !self.shutting_down {
                debug!(worker_id = %worker_id, panicked, "Worker exited");
            }
        }

        self.acknowledge(worker_id);
        self.notify_ready();
        self.replenish();
        self.process_queue();
    }

    fn task_timed_out(&mut self, worker_id: WorkerId, task_id: TaskId) {
        let holds_task = self
            .workers
            .get(&worker_id)
            .and_then(|w| w.current.as_ref())
            .is_some_and(|assigned| assigned.id == task_id);
        if !holds_task {
            return;
        }

        // Dropping the worker's request channel lets its thread exit once the
        // stuck job returns; anything it sends afterwards is ignored.
        if let Some(mut worker) = self.workers.remove(&worker_id) {
            self.detached.insert(worker_id);
            worker.clear_idle_timer();
            if let Some(assigned) = worker.current.take() {
                warn!(
                    task_id = %task_id,
                    worker_id = %worker_id,
                    timeout_ms = self.config.task_timeout.as_millis() as u64,
                    "Task timed out, replacing worker"
                );
                let _ = assigned.reply.send(Err(PoolError::Timeout {
                    task_id,
                    timeout: self.config.task_timeout,
                }));
            }
        }

        self.replenish();
        self.process_queue();
    }

    fn schedule_idle(&mut self, worker_id: WorkerId) {
        if self.shutting_down || self.workers.len() <= self.config.min_workers {
            return;
        }
        let Some(worker) = self.workers.get_mut(&worker_id) else {
            return;
        };
        if worker.busy() || !worker.ready {
            return;
        }
        worker.clear_idle_timer();
        worker.idle_epoch += 1;
        worker.idle_timer = Some(schedule(
            &self.events_tx,
            self.config.idle_timeout,
            Event::IdleExpired {
                worker_id,
                epoch: worker.idle_epoch,
            },
        ));
    }

    fn retire_idle(&mut self, worker_id: WorkerId, epoch: u64) {
        if self.shutting_down || self.workers.len() <= self.config.min_workers {
            return;
        }
        let still_idle = self
            .workers
            .get(&worker_id)
            .is_some_and(|w| !w.busy() && w.idle_epoch == epoch);
        if !still_idle {
            return;
        }
        if let Some(worker) = self.workers.remove(&worker_id) {
            debug!(worker_id = %worker_id, "Retiring idle worker");
            let _ = worker.requests.send(WorkerRequest::Shutdown);
        }
    }

    fn notify_ready(&mut self) {
        if self.workers.values().all(|w| w.ready) {
            for waiter in self.ready_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let total = self.workers.len();
        let active = self.workers.values().filter(|w| w.busy()).count();
        PoolStats {
            active_workers: active,
            idle_workers: total - active,
            queued_tasks: self.queue.len(),
            total_workers: total,
            detached_workers: self.detached.len(),
        }
    }

    fn begin_shutdown(&mut self, reply: oneshot::Sender<()>) {
        self.shutdown_waiters.push(reply);
        if self.shutting_down {
            if self.awaiting_ack.is_empty() {
                self.finish_shutdown();
            }
            return;
        }
        self.shutting_down = true;
        info!(
            workers = self.workers.len(),
            queued = self.queue.len(),
            "Shutting down worker pool"
        );

        for task in self.queue.drain(..) {
            let _ = task.reply.send(Err(PoolError::ShuttingDown));
        }
        for (worker_id, worker) in self.workers.iter_mut() {
            worker.clear_idle_timer();
            if let Some(assigned) = worker.current.take() {
                assigned.timer.abort();
                let _ = assigned.reply.send(Err(PoolError::ShuttingDown));
            }
            if worker.requests.send(WorkerRequest::Shutdown).is_ok() {
                self.awaiting_ack.insert(*worker_id);
            }
        }

        if self.awaiting_ack.is_empty() {
            self.finish_shutdown();
        } else {
            schedule(
                &self.events_tx,
                self.config.shutdown_timeout,
                Event::ShutdownDeadline,
            );
        }
    }

    fn acknowledge(&mut self, worker_id: WorkerId) {
        if self.awaiting_ack.remove(&worker_id) && self.awaiting_ack.is_empty() {
            self.finish_shutdown();
        }
    }

    fn finish_shutdown(&mut self) {
        if !self.awaiting_ack.is_empty() {
            warn!(
                pending = self.awaiting_ack.len(),
                "Shutdown deadline passed before every worker acknowledged"
            );
            self.awaiting_ack.clear();
        }
        self.workers.clear();
        self.detached.clear();
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(());
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("Worker pool shut down");
    }
}

/// Handle to a running worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<WorkerPoolConfig>,
}

impl WorkerPool {
    /// Start the pool and wait until `min_workers` workers report ready.
    pub async fn init(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        let handler: JobHandler = Arc::new(execute_request);
        Self::init_with_handler(config, handler).await
    }

    pub(crate) async fn init_with_handler(
        config: WorkerPoolConfig,
        handler: JobHandler,
    ) -> Result<Self, PoolError> {
        let config = config.normalized();
        info!(
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            "Initializing worker pool"
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(config.clone(), handler, events_tx);
        tokio::spawn(coordinator.run(commands_rx, events_rx));

        let pool = Self {
            commands: commands_tx,
            config: Arc::new(config),
        };
        let (ready_tx, ready_rx) = oneshot::channel();
        pool.send(Command::WaitReady(ready_tx))?;
        match tokio::time::timeout(pool.config.ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                info!("Worker pool ready");
                Ok(pool)
            }
            Ok(Err(_)) => Err(PoolError::ChannelClosed),
            Err(_) => Err(PoolError::Spawn(
                "workers did not report ready in time".into(),
            )),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    fn send(&self, command: Command) -> Result<(), PoolError> {
        self.commands
            .send(command)
            .map_err(|_| PoolError::ChannelClosed)
    }

    /// Queue a raw request and wait for its response, without fallback.
    pub(crate) async fn submit(&self, request: WorkerRequest) -> Result<WorkerResponse, PoolError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit { request, reply })?;
        response.await.map_err(|_| PoolError::ChannelClosed)?
    }

    async fn run_with_fallback<T, X, F>(
        &self,
        request: WorkerRequest,
        extract: X,
        fallback: F,
    ) -> Result<T, CoreError>
    where
        T: Send + 'static,
        X: FnOnce(WorkerResponse) -> Option<T>,
        F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    {
        let kind = request.kind();
        let task_id = request.id().cloned().unwrap_or_else(|| TaskId::new("-"));
        let started = Instant::now();

        let outcome = self.submit(request).await.and_then(|response| {
            extract(response).ok_or_else(|| PoolError::UnexpectedResponse(task_id.clone()))
        });
        match outcome {
            Ok(value) => {
                debug!(
                    task_id = %task_id,
                    kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Worker task completed"
                );
                Ok(value)
            }
            Err(e) => {
                warn!(task_id = %task_id, kind, error = %e, "Worker path failed, running inline");
                let result = run_inline(fallback).await;
                debug!(
                    task_id = %task_id,
                    kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Inline fallback completed"
                );
                result
            }
        }
    }

    /// SHA-256 hex digest of a file.
    pub async fn hash(&self, path: impl AsRef<Path>) -> Result<String, CoreError> {
        let file_path = path.as_ref().to_path_buf();
        let request = WorkerRequest::Hash {
            id: TaskId::generate("task"),
            file_path: file_path.clone(),
        };
        self.run_with_fallback(
            request,
            |response| match response {
                WorkerResponse::HashResult { hash, .. } => Some(hash),
                _ => None,
            },
            move || hash_file(&file_path),
        )
        .await
    }

    /// Parse a JSON document, inflating it first when gzipped.
    pub async fn parse_document(
        &self,
        path: impl AsRef<Path>,
        is_gzipped: bool,
    ) -> Result<Value, CoreError> {
        let file_path = path.as_ref().to_path_buf();
        let request = WorkerRequest::JsonParse {
            id: TaskId::generate("task"),
            file_path: file_path.clone(),
            is_gzipped,
        };
        self.run_with_fallback(
            request,
            |response| match response {
                WorkerResponse::JsonParseResult { data, .. } => Some(data),
                _ => None,
            },
            move || parse_document(&file_path, is_gzipped),
        )
        .await
    }

    /// Aggregate outgoing condition metrics.
    pub async fn compute_metrics(&self, input: &MetricsInput) -> Result<MetricsResult, CoreError> {
        debug!(
            players = input.players.len(),
            targets = input.targets.len(),
            "Metrics task starting"
        );
        let request = WorkerRequest::Metrics {
            id: TaskId::generate("task"),
            payload: Box::new(input.clone()),
        };
        let fallback_input = input.clone();
        self.run_with_fallback(
            request,
            |response| match response {
                WorkerResponse::MetricsResult { result, .. } => Some(*result),
                _ => None,
            },
            move || Ok(compute_metrics(&fallback_input)),
        )
        .await
    }

    /// Current occupancy; all zero once the pool is gone.
    pub async fn stats(&self) -> PoolStats {
        let (reply, stats) = oneshot::channel();
        if self.send(Command::Stats(reply)).is_err() {
            return PoolStats::default();
        }
        stats.await.unwrap_or_default()
    }

    /// Reject outstanding work and stop every worker.
    ///
    /// Later calls to the job operations run inline.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.send(Command::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_inline<T, F>(job: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| CoreError::InvalidInput(format!("inline job failed: {}", e)))?
}

#[async_trait]
impl DocumentReader for WorkerPool {
    async fn read_document(&self, path: &Path, is_gzipped: bool) -> Result<Value, CoreError> {
        self.parse_document(path, is_gzipped).await
    }
}
