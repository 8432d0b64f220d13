//! The seam to the email relay.

use std::sync::Mutex;

use super::error::JobError;
use super::state::BatchJob;
use crate::sanitize;

/// One message for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// The terminal-state message for a job, linking to its status page
    /// when `status_url` is configured.
    pub fn for_job(job: &BatchJob, status_url: Option<&str>) -> Self {
        let mut body = format!("Job {} ({}) finished with status {}.", job.id, job.name, job.status);
        if let Some(progress) = &job.progress {
            body.push_str(&format!("\n\n{}", progress));
        }
        if let Some(base) = status_url {
            body.push_str(&format!("\n\nStatus: {}{}", base, job.id));
        }
        Self {
            recipients: job.notify.clone(),
            subject: format!("CDR batch job {} ({}): {}", job.id, job.name, job.status),
            body,
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn send(&self, message: &Notification) -> Result<(), JobError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl NotificationSink for LoggingSink {
    fn send(&self, message: &Notification) -> Result<(), JobError> {
        log::info!(
            "Notification to [{}]: {}",
            sanitize::redact_recipients(&message.recipients),
            message.subject
        );
        Ok(())
    }
}

/// Keeps every notification; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, message: &Notification) -> Result<(), JobError> {
        self.sent
            .lock()
            .map_err(|_| JobError::Notify("recording sink poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }
}
