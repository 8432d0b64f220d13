use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::controller::JobController;
use super::error::JobError;
use super::state::{BatchJob, BatchStatus};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a handler sees of the job it runs.
pub struct JobContext {
    job: BatchJob,
    controller: JobController,
    token: CancellationToken,
}

impl JobContext {
    pub fn new(job: BatchJob, controller: JobController, token: CancellationToken) -> Self {
        Self {
            job,
            controller,
            token,
        }
    }

    pub fn job(&self) -> &BatchJob {
        &self.job
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.job.arg(name)
    }

    pub fn require_arg(&self, name: &str) -> Result<&str, JobError> {
        self.arg(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| JobError::MissingArg(name.to_string()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Records progress and refreshes the heartbeat. If the job has left
    /// Running (cancelled, or failed by a sweep) the token is tripped.
    pub fn progress(&self, message: &str) -> Result<(), JobError> {
        let status = self
            .controller
            .worker_heartbeat(self.job.id, BatchStatus::Running, Some(message))?;
        if status != BatchStatus::Running {
            self.token.cancel();
        }
        Ok(())
    }

    /// Safe point: returns `Cancelled` once the job has been cancelled.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if !self.token.is_cancelled() {
            let status = self.controller.status(self.job.id)?.status;
            if status != BatchStatus::Running {
                self.token.cancel();
            }
        }
        if self.token.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::notify::LoggingSink;
    use crate::session::{Action, Session};

    #[test]
    fn test_checkpoint_sees_cancellation() {
        let db = Database::open_in_memory().unwrap();
        let jc = JobController::new(db, Session::new("s", "ops", Action::ALL), Arc::new(LoggingSink));
        let id = jc
            .enqueue("A", "report", vec![("out".into(), "x.json".into())], vec![])
            .unwrap();
        let job = jc.claim_next(&["report"]).unwrap().unwrap();
        let ctx = JobContext::new(job, jc.clone(), CancellationToken::new());

        assert_eq!(ctx.require_arg("out").unwrap(), "x.json");
        assert!(matches!(ctx.require_arg("nope"), Err(JobError::MissingArg(_))));
        ctx.progress("1 of 2").unwrap();
        ctx.checkpoint().unwrap();

        jc.cancel(id).unwrap();
        assert!(matches!(ctx.checkpoint(), Err(JobError::Cancelled)));
        assert!(ctx.token().is_cancelled());
    }
}
