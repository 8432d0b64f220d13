//! Job Controller: persistent batch jobs, single-flight per job name,
//! cooperative cancellation, and the worker pool that runs them.

pub mod context;
pub mod controller;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod notify;
pub mod pool;
pub mod retry;
pub mod state;

pub use context::{CancellationToken, JobContext};
pub use controller::{required_action, JobController, DEFAULT_STALE_AFTER};
pub use error::JobError;
pub use handler::{HandlerRegistry, JobHandler};
pub use notify::{LoggingSink, Notification, NotificationSink, RecordingSink};
pub use pool::{run_job, run_once, JobOutcome, PoolConfig, WorkerPool};
pub use retry::RetryPolicy;
pub use state::{BatchJob, BatchStatus, JobArgs, JobQuery, JobStatusReport, Transition};

/// Publishing runs.
pub const PUBLISH_COMMAND: &str = "publish";
/// Reference rewrites from one document to another.
pub const GLOBAL_CHANGE_COMMAND: &str = "global-link-change";
pub const UNPUBLISHED_REPORT_COMMAND: &str = "unpublished-changes-report";
