//! Worker-level errors.

use std::time::Duration;

use logrelay_core::{TaskId, WorkerId};
use thiserror::Error;

/// Why a task handed to a worker did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool is draining; queued and running tasks are rejected.
    #[error("Worker pool shutting down")]
    ShuttingDown,

    /// The coordinator is gone.
    #[error("Worker pool is not running")]
    ChannelClosed,

    /// The worker crashed or disappeared while holding the task.
    #[error("{worker_id} failed: {message}")]
    WorkerFault { worker_id: WorkerId, message: String },

    /// The task exceeded its deadline and its worker was replaced.
    #[error("Task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },

    /// The worker reported an error for the task.
    #[error("Task failed: {0}")]
    Task(String),

    /// The worker answered with the wrong response kind.
    #[error("Unexpected response for task {0}")]
    UnexpectedResponse(TaskId),

    /// Workers could not be started.
    #[error("Failed to start worker: {0}")]
    Spawn(String),
}
