use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};
use tracing::info_span;

use super::context::{CancellationToken, JobContext};
use super::controller::JobController;
use super::error::JobError;
use super::handler::HandlerRegistry;
use super::retry::RetryPolicy;
use super::state::{BatchJob, BatchStatus};
use crate::config::JobsConfig;
use crate::error::Result;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// How one job ended, as seen by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: i64,
    pub job_name: String,
    pub status: BatchStatus,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub retry: RetryPolicy,
}

impl PoolConfig {
    pub fn from_config(jobs: &JobsConfig) -> Self {
        Self {
            worker_count: jobs.worker_count.max(1),
            poll_interval: Duration::from_millis(jobs.poll_interval_ms),
            sweep_interval: Duration::from_secs(jobs.heartbeat_interval_secs.max(1)),
            retry: RetryPolicy::from_config(jobs),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}

/// Runs one claimed job to its end and records the final status.
pub fn run_job(
    controller: &JobController,
    handlers: &HandlerRegistry,
    retry: &RetryPolicy,
    job: BatchJob,
) -> JobOutcome {
    let _span = info_span!("batch_job", id = job.id, name = %job.name, command = %job.command).entered();
    let job_id = job.id;
    let job_name = job.name.clone();

    let result = match handlers.get(&job.command) {
        Some(handler) => {
            let ctx = JobContext::new(job, controller.clone(), CancellationToken::new());
            retry.run(
                || handler.run(&ctx),
                |_, _| {
                    if let Err(e) = controller.record_attempt(job_id) {
                        error!("Could not count retry for job {}: {}", job_id, e);
                    }
                },
            )
        }
        None => Err(JobError::Failed(format!("no handler for command '{}'", job.command))),
    };

    let (requested, message) = match result {
        Ok(message) => (BatchStatus::Success, message),
        Err(JobError::Cancelled) => (BatchStatus::Cancelled, "stopped after cancellation".to_string()),
        Err(e) => (BatchStatus::Failure, e.to_string()),
    };
    let status = match controller.worker_heartbeat(job_id, requested, Some(&message)) {
        Ok(status) => status,
        Err(e) => {
            // The row stays Running; the supervisor sweep will fail it.
            error!("Could not record final status of job {}: {}", job_id, e);
            BatchStatus::Running
        }
    };
    info!("Job {} '{}' ended {}", job_id, job_name, status);
    JobOutcome {
        job_id,
        job_name,
        status,
        message,
    }
}

/// Claims and runs at most one job.
pub fn run_once(
    controller: &JobController,
    handlers: &HandlerRegistry,
    retry: &RetryPolicy,
) -> Result<Option<JobOutcome>> {
    let commands = handlers.commands();
    match controller.claim_next(&commands)? {
        Some(job) => Ok(Some(run_job(controller, handlers, retry, job))),
        None => Ok(None),
    }
}

/// Worker threads that claim queued jobs, plus a supervisor thread that
/// sweeps dead ones.
pub struct WorkerPool {
    result_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn start(controller: JobController, handlers: HandlerRegistry, config: PoolConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let (result_sender, result_receiver) = bounded::<JobOutcome>(worker_count * 16);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handlers = Arc::new(handlers);

        let mut workers = Vec::with_capacity(worker_count + 1);
        for worker_id in 0..worker_count {
            let controller = controller.clone();
            let handlers = Arc::clone(&handlers);
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let config = config.clone();
            workers.push(thread::spawn(move || {
                run_worker(worker_id, controller, handlers, result_tx, shutdown_flag, config);
            }));
        }

        let supervisor_shutdown = Arc::clone(&shutdown);
        let sweep_interval = config.sweep_interval;
        workers.push(thread::spawn(move || {
            run_supervisor(controller, supervisor_shutdown, sweep_interval);
        }));

        info!("Started {} job workers", worker_count);
        Self {
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Collects results until none arrives within `timeout`.
    pub fn drain_results(&self, timeout: Duration) -> Vec<JobOutcome> {
        let mut out = Vec::new();
        loop {
            match self.result_receiver.recv_timeout(timeout) {
                Ok(outcome) => out.push(outcome),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        out
    }

    pub fn shutdown(&self) {
        info!("Shutting down job workers...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Waits for every thread. Jobs already running finish first.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Job worker {} panicked: {:?}", i, e);
            }
        }
        info!("All job workers have stopped");
    }
}

/// Sleeps up to `total`, waking early on shutdown. Returns false on shutdown.
fn idle(shutdown: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline.saturating_duration_since(Instant::now())));
    }
    !shutdown.load(Ordering::Relaxed)
}

fn run_worker(
    worker_id: usize,
    controller: JobController,
    handlers: Arc<HandlerRegistry>,
    result_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    config: PoolConfig,
) {
    debug!("Job worker {} started", worker_id);
    while !shutdown.load(Ordering::Relaxed) {
        match run_once(&controller, &handlers, &config.retry) {
            Ok(Some(outcome)) => {
                if result_sender.send_timeout(outcome, SHUTDOWN_POLL).is_err() {
                    debug!("Job worker {}: result not collected", worker_id);
                }
            }
            Ok(None) => {
                if !idle(&shutdown, config.poll_interval) {
                    break;
                }
            }
            Err(e) => {
                error!("Job worker {} could not claim work: {}", worker_id, e);
                if !idle(&shutdown, config.poll_interval) {
                    break;
                }
            }
        }
    }
    debug!("Job worker {} stopped", worker_id);
}

fn run_supervisor(controller: JobController, shutdown: Arc<AtomicBool>, interval: Duration) {
    loop {
        match controller.sweep_stale(Utc::now()) {
            Ok(failed) if !failed.is_empty() => info!("Sweep failed {} stale jobs", failed.len()),
            Ok(_) => {}
            Err(e) => error!("Stale job sweep failed: {}", e),
        }
        if !idle(&shutdown, interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::db::Database;
    use crate::jobs::handler::JobHandler;
    use crate::jobs::notify::LoggingSink;
    use crate::session::{Action, Session};

    struct Flaky {
        calls: AtomicUsize,
        fail_times: usize,
    }

    impl JobHandler for Flaky {
        fn command(&self) -> &'static str {
            "flaky"
        }

        fn run(&self, ctx: &JobContext) -> std::result::Result<String, JobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.checkpoint()?;
            if n < self.fail_times {
                Err(JobError::Transient("database busy".into()))
            } else {
                Ok(format!("done after {} calls", n + 1))
            }
        }
    }

    fn controller() -> JobController {
        let db = Database::open_in_memory().unwrap();
        JobController::new(db, Session::new("s", "ops", Action::ALL), Arc::new(LoggingSink))
    }

    fn registry(fail_times: usize) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_times,
        }));
        registry
    }

    #[test]
    fn test_run_once_retries_then_succeeds() {
        let jc = controller();
        let id = jc.enqueue("F", "flaky", vec![], vec![]).unwrap();
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        let outcome = run_once(&jc, &registry(2), &retry).unwrap().unwrap();
        assert_eq!(outcome.status, BatchStatus::Success);
        assert_eq!(outcome.message, "done after 3 calls");
        assert_eq!(jc.job(id).unwrap().attempts, 3);
        assert!(run_once(&jc, &registry(0), &retry).unwrap().is_none());
    }

    #[test]
    fn test_exhausted_retries_fail_job() {
        let jc = controller();
        let id = jc.enqueue("F", "flaky", vec![], vec![]).unwrap();
        let retry = RetryPolicy::new(1, Duration::from_millis(1));
        let outcome = run_once(&jc, &registry(5), &retry).unwrap().unwrap();
        assert_eq!(outcome.status, BatchStatus::Failure);
        assert_eq!(jc.status(id).unwrap().status, BatchStatus::Failure);
    }

    #[test]
    fn test_cancelled_before_run() {
        let jc = controller();
        let id = jc.enqueue("F", "flaky", vec![], vec![]).unwrap();
        let job = jc.claim_next(&["flaky"]).unwrap().unwrap();
        jc.cancel(id).unwrap();
        let outcome = run_job(&jc, &registry(0), &RetryPolicy::none(), job);
        assert_eq!(outcome.status, BatchStatus::Cancelled);
    }

    #[test]
    fn test_pool_runs_queued_jobs() {
        let jc = controller();
        let a = jc.enqueue("A", "flaky", vec![], vec![]).unwrap();
        let b = jc.enqueue("B", "flaky", vec![], vec![]).unwrap();
        let pool = WorkerPool::start(
            jc.clone(),
            registry(0),
            PoolConfig {
                worker_count: 2,
                poll_interval: Duration::from_millis(20),
                sweep_interval: Duration::from_secs(60),
                retry: RetryPolicy::none(),
            },
        );
        let mut done = Vec::new();
        for _ in 0..2 {
            let outcome = pool.recv_result_timeout(Duration::from_secs(10)).unwrap();
            assert_eq!(outcome.status, BatchStatus::Success);
            done.push(outcome.job_id);
        }
        done.sort();
        assert_eq!(done, vec![a, b]);
        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait();
    }
}
