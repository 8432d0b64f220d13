//! Publication Ledger: publication jobs, the document versions each job
//! pushed or withdrew, and the public projection.

pub mod ledger;
pub mod writer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::pub_repo::{PubEventRow, PubJobRow};
use crate::error::CdrError;
use crate::ids::DocId;
use crate::time;

pub use crate::db::pub_repo::FULL_LOAD_SUBSET;
pub use ledger::PublicationLedger;
pub use writer::LedgerWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PubJobStatus {
    Pending,
    InProgress,
    Success,
    Failure,
    Cancelled,
}

impl PubJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PubJobStatus::Pending => "Pending",
            PubJobStatus::InProgress => "InProgress",
            PubJobStatus::Success => "Success",
            PubJobStatus::Failure => "Failure",
            PubJobStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(text: &str) -> Result<Self, CdrError> {
        match text {
            "Pending" => Ok(PubJobStatus::Pending),
            "InProgress" | "In process" => Ok(PubJobStatus::InProgress),
            "Success" => Ok(PubJobStatus::Success),
            "Failure" => Ok(PubJobStatus::Failure),
            "Cancelled" => Ok(PubJobStatus::Cancelled),
            other => Err(CdrError::InvalidInput(format!(
                "unknown publication job status '{}'",
                other
            ))),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            PubJobStatus::Success | PubJobStatus::Failure | PubJobStatus::Cancelled
        )
    }
}

impl fmt::Display for PubJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationJob {
    pub id: i64,
    pub subset: String,
    pub status: PubJobStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    /// `None` for push-only jobs.
    pub output_dir: Option<String>,
    pub user: String,
    pub messages: Option<String>,
}

impl PublicationJob {
    pub(crate) fn from_row(row: PubJobRow) -> Result<Self, CdrError> {
        Ok(Self {
            id: row.id,
            status: PubJobStatus::parse(&row.status)?,
            subset: row.pub_subset,
            started_at: row.started,
            completed_at: row.completed,
            output_dir: Some(row.output_dir).filter(|d| !d.is_empty()),
            user: row.usr,
            messages: row.messages,
        })
    }

    pub fn is_push_only(&self) -> bool {
        self.output_dir.is_none()
    }
}

/// One document touched by a publication job, with the job's start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationEvent {
    pub job_id: i64,
    pub doc_id: DocId,
    pub doc_version: u32,
    pub removed: bool,
    pub failure: bool,
    pub started_at: String,
    pub output_dir: Option<String>,
    pub subset: String,
    pub job_status: PubJobStatus,
}

impl PublicationEvent {
    pub(crate) fn from_row(row: PubEventRow) -> Result<Self, CdrError> {
        Ok(Self {
            job_id: row.job_id,
            doc_id: row.doc_id,
            doc_version: row.doc_version,
            removed: row.removed,
            failure: row.failure,
            job_status: PubJobStatus::parse(&row.job_status)?,
            started_at: row.started,
            output_dir: Some(row.output_dir).filter(|d| !d.is_empty()),
            subset: row.pub_subset,
        })
    }

    /// True when the job succeeded and this document did not fail.
    pub fn succeeded(&self) -> bool {
        self.job_status == PubJobStatus::Success && !self.failure
    }

    /// Pushes go to the public site; events with an output directory are
    /// vendor exports.
    pub fn is_push(&self) -> bool {
        self.output_dir.is_none()
    }

    /// Display label: `2024-01-05(C-17)` for a push, `(V-17)` for a job
    /// with an output directory, `R` appended for removals.
    pub fn label(&self) -> String {
        let kind = if self.output_dir.is_some() { 'V' } else { 'C' };
        format!(
            "{}({}-{}){}",
            time::date_part(&self.started_at),
            kind,
            self.job_id,
            if self.removed { "R" } else { "" }
        )
    }
}

/// The latest push of a document: `(job_id, started_at, doc_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPublication {
    pub job_id: i64,
    pub started_at: String,
    pub doc_version: u32,
}
