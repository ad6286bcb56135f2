//! Pool and tool worker configuration.

use std::time::Duration;

/// Sizing and timing of the generic worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Workers kept alive even when idle.
    pub min_workers: usize,

    /// Upper bound on live workers.
    pub max_workers: usize,

    /// Idle time after which a worker above `min_workers` is retired.
    pub idle_timeout: Duration,

    /// Per-task deadline; the worker running an expired task is replaced.
    ///
    /// A thread cannot be killed, so the replaced one is detached and keeps
    /// running its job. Until it exits it still counts against
    /// `max_workers` for growth, although the pool always refills to
    /// `min_workers`.
    pub task_timeout: Duration,

    /// How long `init` waits for the initial workers to report ready.
    pub ready_timeout: Duration,

    /// How long `shutdown` waits for acknowledgements.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            min_workers: 1,
            max_workers: cpus.saturating_sub(1).max(1),
            idle_timeout: Duration::from_secs(30),
            task_timeout: Duration::from_secs(120),
            ready_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl WorkerPoolConfig {
    /// Clamp the bounds so that `1 <= max_workers` and `min_workers <= max_workers`.
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self.min_workers = self.min_workers.min(self.max_workers);
        self
    }
}

/// Timing of the single external-tool worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolWorkerConfig {
    /// Per-task deadline for one tool run.
    pub task_timeout: Duration,

    /// How long `init` waits for the worker to report ready.
    pub ready_timeout: Duration,

    /// How long `shutdown` waits for the acknowledgement.
    pub shutdown_timeout: Duration,
}

impl Default for ToolWorkerConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(10 * 60),
            ready_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}
