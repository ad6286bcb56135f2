//! Background workers for logrelay
//!
//! Two coordinators live here:
//!
//! - [`WorkerPool`]: a dynamically sized set of worker threads for CPU-bound
//!   jobs (hashing, document parsing, metrics). Every operation falls back to
//!   running inline when the worker path fails.
//! - [`ToolWorker`]: a single worker that serializes runs of the external
//!   analysis tool and enforces a per-run deadline.
//!
//! Both are explicit handles with `init`/`shutdown` lifecycles rather than
//! process-wide singletons.

mod config;
mod error;
mod pool;
mod tool_worker;

pub use config::{ToolWorkerConfig, WorkerPoolConfig};
pub use error::PoolError;
pub use pool::{execute_request, PoolStats, WorkerPool};
pub use tool_worker::{ToolJob, ToolWorker};
