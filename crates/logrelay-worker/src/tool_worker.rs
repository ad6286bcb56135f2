//! Single-slot worker for the external analysis tool.
//!
//! Exactly one worker task runs at a time and tasks are served strictly in
//! FIFO order. A task that exceeds its deadline gets its worker aborted,
//! which drops (and so kills) the tool subprocess; a fresh worker takes
//! over the rest of the queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use logrelay_core::{ExternalToolRequest, ExternalToolResult, TaskId, WorkerId, WorkerRequest, WorkerResponse};
use logrelay_external::ExternalToolRunner;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ToolWorkerConfig;
use crate::error::PoolError;

/// The job a tool worker performs for each request.
#[async_trait]
pub trait ToolJob: Send + Sync {
    async fn run(&self, request: &ExternalToolRequest) -> ExternalToolResult;
}

#[async_trait]
impl ToolJob for ExternalToolRunner {
    async fn run(&self, request: &ExternalToolRequest) -> ExternalToolResult {
        ExternalToolRunner::run(self, request).await
    }
}

type Reply = oneshot::Sender<Result<WorkerResponse, PoolError>>;

enum Command {
    Submit { request: WorkerRequest, reply: Reply },
    WaitReady(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Message { generation: u64, response: WorkerResponse },
    Exited { generation: u64, panicked: bool },
    TaskTimeout { task_id: TaskId },
    ShutdownDeadline,
}

struct Task {
    id: TaskId,
    request: WorkerRequest,
    reply: Reply,
}

struct Assigned {
    id: TaskId,
    reply: Reply,
    started_at: Instant,
    timer: JoinHandle<()>,
}

struct WorkerHandle {
    generation: u64,
    requests: mpsc::UnboundedSender<WorkerRequest>,
    task: JoinHandle<()>,
    ready: bool,
}

fn schedule(events: &mpsc::UnboundedSender<Event>, after: Duration, event: Event) -> JoinHandle<()> {
    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = events.send(event);
    })
}

struct ExitNotice {
    generation: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Exited {
            generation: self.generation,
            panicked: std::thread::panicking(),
        });
    }
}

async fn worker_loop(
    generation: u64,
    job: Arc<dyn ToolJob>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<Event>,
) {
    let _notice = ExitNotice {
        generation,
        events: events.clone(),
    };
    let send = |response| events.send(Event::Message { generation, response }).is_ok();

    if !send(WorkerResponse::Ready) {
        return;
    }
    while let Some(request) = requests.recv().await {
        let response = match request {
            WorkerRequest::RunExternal { id, payload } => {
                let result = job.run(&payload).await;
                WorkerResponse::ExternalResult {
                    id,
                    result: Box::new(result),
                }
            }
            WorkerRequest::Shutdown => {
                send(WorkerResponse::ShutdownAck);
                break;
            }
            other => match other.id().cloned() {
                Some(id) => WorkerResponse::error(
                    id,
                    format!("{} is not handled by the tool worker", other.kind()),
                ),
                None => continue,
            },
        };
        if !send(response) {
            break;
        }
    }
}

struct Coordinator {
    config: ToolWorkerConfig,
    job: Arc<dyn ToolJob>,
    events_tx: mpsc::UnboundedSender<Event>,
    worker: Option<WorkerHandle>,
    generation: u64,
    queue: VecDeque<Task>,
    current: Option<Assigned>,
    ready_waiters: Vec<oneshot::Sender<()>>,
    shutting_down: bool,
    awaiting_ack: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.spawn_worker();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        if let Some(assigned) = self.current.take() {
            assigned.timer.abort();
        }
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
        }
        debug!("Tool worker coordinator stopped");
    }

    fn spawn_worker(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker_loop(
            generation,
            self.job.clone(),
            requests_rx,
            self.events_tx.clone(),
        ));
        debug!(generation, "Spawned tool worker");
        self.worker = Some(WorkerHandle {
            generation,
            requests: requests_tx,
            task,
            ready: false,
        });
    }

    fn worker_id(&self) -> WorkerId {
        WorkerId::new(self.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.generation == generation)
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
                debug!(task_id = %id, queued = self.queue.len(), "Tool task queued");
                self.queue.push_back(Task { id, request, reply });
                self.process_queue();
            }
            Command::WaitReady(reply) => {
                self.ready_waiters.push(reply);
                self.notify_ready();
            }
            Command::Shutdown(reply) => self.begin_shutdown(reply),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message { generation, .. } if !self.is_current(generation) => {
                debug!(generation, "Ignoring message from replaced tool worker");
            }
            Event::Message {
                response: WorkerResponse::Ready,
                ..
            } => {
                if let Some(worker) = self.worker.as_mut() {
                    worker.ready = true;
                }
                self.notify_ready();
                self.process_queue();
            }
            Event::Message {
                response: WorkerResponse::ShutdownAck,
                ..
            } => {
                if self.awaiting_ack {
                    self.finish_shutdown();
                }
            }
            Event::Message { response, .. } => self.complete(response),
            Event::Exited {
                generation,
                panicked,
            } => self.worker_exited(generation, panicked),
            Event::TaskTimeout { task_id } => self.task_timed_out(task_id),
            Event::ShutdownDeadline => {
                if self.shutting_down {
                    self.finish_shutdown();
                }
            }
        }
    }

    fn process_queue(&mut self) {
        if self.shutting_down || self.current.is_some() {
            return;
        }
        let ready = self.worker.as_ref().is_some_and(|w| w.ready);
        if !ready {
            return;
        }
        let Some(task) = self.queue.pop_front() else {
            return;
        };
        let Some(worker) = self.worker.as_ref() else {
            self.queue.push_front(task);
            return;
        };

        let Task { id, request, reply } = task;
        if let Err(mpsc::error::SendError(request)) = worker.requests.send(request) {
            warn!(task_id = %id, "Tool worker channel closed, respawning");
            self.queue.push_front(Task { id, request, reply });
            self.replace_worker();
            return;
        }

        info!(task_id = %id, queued = self.queue.len(), "Tool task started");
        let timer = schedule(
            &self.events_tx,
            self.config.task_timeout,
            Event::TaskTimeout {
                task_id: id.clone(),
            },
        );
        self.current = Some(Assigned {
            id,
            reply,
            started_at: Instant::now(),
            timer,
        });
    }

    fn complete(&mut self, response: WorkerResponse) {
        let matches = self
            .current
            .as_ref()
            .is_some_and(|assigned| Some(&assigned.id) == response.id());
        if !matches {
            warn!(task_id = ?response.id(), "Tool worker response for unknown task");
            return;
        }
        let Some(assigned) = self.current.take() else {
            return;
        };
        assigned.timer.abort();
        info!(
            task_id = %assigned.id,
            elapsed_ms = assigned.started_at.elapsed().as_millis() as u64,
            "Tool task finished"
        );
        let result = match response {
            WorkerResponse::Error { error, .. } => Err(PoolError::Task(error)),
            other => Ok(other),
        };
        let _ = assigned.reply.send(result);
        self.process_queue();
    }

    fn replace_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
        }
        if !self.shutting_down {
            self.spawn_worker();
        }
    }

    fn worker_exited(&mut self, generation: u64, panicked: bool) {
        if !self.is_current(generation) {
            return;
        }
        let worker_id = self.worker_id();
        self.worker = None;

        if let Some(assigned) = self.current.take() {
            assigned.timer.abort();
            let message = if panicked {
                "tool worker panicked"
            } else {
                "tool worker exited"
            };
            warn!(task_id = %assigned.id, message, "Rejecting task of failed tool worker");
            let _ = assigned.reply.send(Err(PoolError::WorkerFault {
                worker_id,
                message: message.to_string(),
            }));
        }

        if self.awaiting_ack {
            self.finish_shutdown();
        } else if !self.shutting_down {
            warn!(generation, "Tool worker exited unexpectedly, respawning");
            self.spawn_worker();
        }
    }

    fn task_timed_out(&mut self, task_id: TaskId) {
        let holds_task = self
            .current
            .as_ref()
            .is_some_and(|assigned| assigned.id == task_id);
        if !holds_task {
            return;
        }
        if let Some(assigned) = self.current.take() {
            warn!(
                task_id = %task_id,
                timeout_ms = self.config.task_timeout.as_millis() as u64,
                "Tool task timed out, terminating worker"
            );
            let _ = assigned.reply.send(Err(PoolError::Timeout {
                task_id,
                timeout: self.config.task_timeout,
            }));
        }
        self.replace_worker();
    }

    fn notify_ready(&mut self) {
        let ready = self.worker.as_ref().map_or(true, |w| w.ready);
        if ready {
            for waiter in self.ready_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn begin_shutdown(&mut self, reply: oneshot::Sender<()>) {
        self.shutdown_waiters.push(reply);
        if self.shutting_down {
            if !self.awaiting_ack {
                self.finish_shutdown();
            }
            return;
        }
        self.shutting_down = true;
        info!(queued = self.queue.len(), "Shutting down tool worker");

        for task in self.queue.drain(..) {
            let _ = task.reply.send(Err(PoolError::ShuttingDown));
        }
        if let Some(assigned) = self.current.take() {
            assigned.timer.abort();
            let _ = assigned.reply.send(Err(PoolError::ShuttingDown));
        }

        let sent = self
            .worker
            .as_ref()
            .is_some_and(|w| w.requests.send(WorkerRequest::Shutdown).is_ok());
        if sent {
            self.awaiting_ack = true;
            schedule(
                &self.events_tx,
                self.config.shutdown_timeout,
                Event::ShutdownDeadline,
            );
        } else {
            self.finish_shutdown();
        }
    }

    fn finish_shutdown(&mut self) {
        if self.awaiting_ack && self.worker.is_some() {
            debug!("Tool worker stopped without acknowledgement, aborting");
        }
        self.awaiting_ack = false;
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
        }
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(());
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("Tool worker shut down");
    }
}

/// Handle to the external-tool worker. Cheap to clone.
#[derive(Clone)]
pub struct ToolWorker {
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<ToolWorkerConfig>,
}

impl ToolWorker {
    /// Start the worker and wait for it to report ready.
    pub async fn init(job: Arc<dyn ToolJob>, config: ToolWorkerConfig) -> Result<Self, PoolError> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            config: config.clone(),
            job,
            events_tx,
            worker: None,
            generation: 0,
            queue: VecDeque::new(),
            current: None,
            ready_waiters: Vec::new(),
            shutting_down: false,
            awaiting_ack: false,
            shutdown_waiters: Vec::new(),
        };
        tokio::spawn(coordinator.run(commands_rx, events_rx));

        let worker = Self {
            commands: commands_tx,
            config: Arc::new(config),
        };
        let (ready_tx, ready_rx) = oneshot::channel();
        worker.send(Command::WaitReady(ready_tx))?;
        match tokio::time::timeout(worker.config.ready_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(worker),
            Ok(Err(_)) => Err(PoolError::ChannelClosed),
            Err(_) => Err(PoolError::Spawn(
                "tool worker did not report ready in time".into(),
            )),
        }
    }

    pub fn config(&self) -> &ToolWorkerConfig {
        &self.config
    }

    fn send(&self, command: Command) -> Result<(), PoolError> {
        self.commands
            .send(command)
            .map_err(|_| PoolError::ChannelClosed)
    }

    /// Queue one tool run and wait for it.
    ///
    /// Tool-level failures come back as an error result; `Err` means the
    /// worker itself failed (timeout, crash, shutdown).
    pub async fn run_external_tool(
        &self,
        request: ExternalToolRequest,
    ) -> Result<ExternalToolResult, PoolError> {
        let id = TaskId::generate("ext");
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit {
            request: WorkerRequest::RunExternal {
                id: id.clone(),
                payload: request,
            },
            reply,
        })?;
        match response.await.map_err(|_| PoolError::ChannelClosed)?? {
            WorkerResponse::ExternalResult { result, .. } => Ok(*result),
            _ => Err(PoolError::UnexpectedResponse(id)),
        }
    }

    /// Reject outstanding runs and stop the worker.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.send(Command::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }
    }
}
