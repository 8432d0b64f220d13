//! In-process broadcast of batch job state transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::jobs::BatchStatus;

/// One transition of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: i64,
    pub job_name: String,
    /// `None` for the enqueue event.
    pub from: Option<BatchStatus>,
    pub to: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(
        job_id: i64,
        job_name: &str,
        from: Option<BatchStatus>,
        to: BatchStatus,
        message: Option<&str>,
    ) -> Self {
        Self {
            job_id,
            job_name: job_name.to_string(),
            from,
            to,
            message: message.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

/// Fans job events out to any number of observers. Sending with no
/// observers is not an error.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: JobEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("No job event listeners");
        }
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_receive() {
        let broadcaster = JobEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        broadcaster.send(JobEvent::new(7, "Weekly", Some(BatchStatus::Queued), BatchStatus::Running, None));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, 7);
        assert_eq!(received.to, BatchStatus::Running);
        assert!(!received.is_terminal());
    }

    #[test]
    fn test_send_without_listeners() {
        let broadcaster = JobEventBroadcaster::default();
        broadcaster.send(JobEvent::new(1, "x", None, BatchStatus::Queued, Some("queued")));
    }
}
