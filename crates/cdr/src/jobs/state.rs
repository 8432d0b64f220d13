//! Batch job records and the status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::batch_repo::{BatchJobRow, TransitionRow};
use crate::error::{CdrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Queued => "Queued",
            BatchStatus::Running => "Running",
            BatchStatus::Success => "Success",
            BatchStatus::Failure => "Failure",
            BatchStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(BatchStatus::Queued),
            "running" | "in process" => Ok(BatchStatus::Running),
            "success" | "completed" => Ok(BatchStatus::Success),
            "failure" | "aborted" => Ok(BatchStatus::Failure),
            "cancelled" | "stopped" => Ok(BatchStatus::Cancelled),
            _ => Err(CdrError::InvalidInput(format!("unknown job status '{}'", text))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Success | BatchStatus::Failure | BatchStatus::Cancelled
        )
    }

    /// Legal moves. Queued jobs may also be failed by an operator.
    pub fn can_move_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Queued, Failure)
                | (Running, Success)
                | (Running, Failure)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job argument. Order is kept as given.
pub type JobArgs = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub args: JobArgs,
    pub notify: Vec<String>,
    pub status: BatchStatus,
    pub progress: Option<String>,
    pub attempts: u32,
    pub requested_by: String,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_heartbeat: Option<String>,
}

impl BatchJob {
    pub fn from_row(row: BatchJobRow) -> Result<Self> {
        let args: JobArgs = serde_json::from_str(&row.args).map_err(|e| {
            CdrError::InvariantViolation(format!("job {} has unreadable args: {}", row.id, e))
        })?;
        let notify: Vec<String> = serde_json::from_str(&row.notify).map_err(|e| {
            CdrError::InvariantViolation(format!("job {} has unreadable recipients: {}", row.id, e))
        })?;
        Ok(Self {
            id: row.id,
            status: BatchStatus::parse(&row.status)?,
            name: row.name,
            command: row.command,
            args,
            notify,
            progress: row.progress,
            attempts: row.attempts,
            requested_by: row.requested_by,
            queued_at: row.queued_at,
            started_at: row.started,
            completed_at: row.completed,
            last_heartbeat: row.last_heartbeat,
        })
    }

    /// First value of a named argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn status_report(&self) -> JobStatusReport {
        JobStatusReport {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            progress: self.progress.clone(),
            started_at: self.started_at.clone(),
            completed_at: self.completed_at.clone(),
            notify: self.notify.clone(),
        }
    }
}

/// What the status page shows for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub id: i64,
    pub name: String,
    pub status: BatchStatus,
    pub progress: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub notify: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Option<BatchStatus>,
    pub to: BatchStatus,
    pub at: String,
    pub message: Option<String>,
}

impl Transition {
    pub fn from_row(row: TransitionRow) -> Result<Self> {
        Ok(Self {
            from: row.from_status.as_deref().map(BatchStatus::parse).transpose()?,
            to: BatchStatus::parse(&row.to_status)?,
            at: row.dt,
            message: row.message,
        })
    }
}

/// Filters for the job history view. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQuery {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// Only jobs queued within this many days.
    pub age_days: Option<u32>,
    pub status: Option<BatchStatus>,
    pub limit: Option<u32>,
}
