use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::notify::{Notification, NotificationSink};
use super::state::{BatchJob, BatchStatus, JobArgs, JobQuery, JobStatusReport, Transition};
use super::{GLOBAL_CHANGE_COMMAND, PUBLISH_COMMAND};
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::db::batch_repo::{self, BatchJobFilter};
use crate::db::Database;
use crate::error::{CdrError, Result};
use crate::sanitize;
use crate::session::{Action, Session};
use crate::time;

/// Heartbeat age after which a Running job is presumed dead.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// Enqueue, status, cancellation and worker bookkeeping for batch jobs.
///
/// Every status change happens inside an immediate transaction together
/// with its `batch_job_transition` row.
#[derive(Clone)]
pub struct JobController {
    db: Database,
    session: Session,
    notifier: Arc<dyn NotificationSink>,
    events: Option<JobEventBroadcaster>,
    status_url: Option<String>,
    stale_after: Duration,
}

/// A status change that committed.
struct Moved {
    job: BatchJob,
    from: BatchStatus,
}

fn load(conn: &Connection, id: i64) -> Result<BatchJob> {
    let row = batch_repo::find_by_id(conn, id)?.ok_or_else(|| CdrError::not_found("Job", id))?;
    BatchJob::from_row(row)
}

/// Applies one legal move inside the caller's transaction. Returns `None`
/// when the job is not in a state that allows it.
fn move_job(
    conn: &Connection,
    job: &BatchJob,
    to: BatchStatus,
    message: Option<&str>,
    now: &str,
) -> Result<Option<Moved>> {
    if !job.status.can_move_to(to) {
        return Ok(None);
    }
    let changed = match to {
        BatchStatus::Running => batch_repo::mark_running(conn, job.id, now)?,
        _ => batch_repo::finish(conn, job.id, to.as_str(), message, now)?,
    };
    if !changed {
        return Ok(None);
    }
    batch_repo::insert_transition(conn, job.id, Some(job.status.as_str()), to.as_str(), now, message)?;
    Ok(Some(Moved {
        job: load(conn, job.id)?,
        from: job.status,
    }))
}

/// Right needed to submit or steer jobs running `command`.
pub fn required_action(command: &str) -> Option<Action> {
    match command {
        PUBLISH_COMMAND => Some(Action::UsePublishingSystem),
        GLOBAL_CHANGE_COMMAND => Some(Action::GlobalChange),
        _ => None,
    }
}

impl JobController {
    pub fn new(db: Database, session: Session, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            db,
            session,
            notifier,
            events: None,
            status_url: None,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_events(mut self, events: JobEventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    /// Base URL of the status page; the job id is appended in notifications.
    pub fn with_status_url(mut self, url: Option<String>) -> Self {
        self.status_url = url;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn require_for(&self, command: &str) -> Result<()> {
        match required_action(command) {
            Some(action) => self.session.require(action),
            None => Ok(()),
        }
    }

    /// Queues a job. At most one job per `name` may be Queued or Running.
    pub fn enqueue(&self, name: &str, command: &str, args: JobArgs, notify: Vec<String>) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() || command.trim().is_empty() {
            return Err(CdrError::InvalidInput("job name and command are required".to_string()));
        }
        self.require_for(command)?;
        let args_json = serde_json::to_string(&args)
            .map_err(|e| CdrError::InvalidInput(format!("job arguments: {}", e)))?;
        let notify: Vec<String> = notify
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        let notify_json = serde_json::to_string(&notify)
            .map_err(|e| CdrError::InvalidInput(format!("job recipients: {}", e)))?;

        let id = self.db.with_tx(|tx| {
            let conflict = |active_job: i64| CdrError::ConcurrencyConflict {
                job_name: name.to_string(),
                active_job,
            };
            if let Some(active) = batch_repo::active_for_name(tx, name)? {
                return Err(conflict(active.id));
            }
            let now = time::now();
            let id = match batch_repo::insert(
                tx,
                name,
                command,
                &args_json,
                &notify_json,
                &self.session.user,
                &now,
            ) {
                Ok(id) => id,
                Err(e) if e.is_unique_violation() => {
                    let active = batch_repo::active_for_name(tx, name)?;
                    return Err(conflict(active.map_or(0, |a| a.id)));
                }
                Err(e) => return Err(e.into()),
            };
            batch_repo::insert_transition(tx, id, None, BatchStatus::Queued.as_str(), &now, None)?;
            Ok(id)
        })?;

        log::info!(
            "Queued job {} '{}' ({}) for {} notify=[{}]",
            id,
            name,
            command,
            self.session.user,
            sanitize::redact_recipients(&notify)
        );
        self.broadcast(JobEvent::new(id, name, None, BatchStatus::Queued, None));
        Ok(id)
    }

    pub fn job(&self, id: i64) -> Result<BatchJob> {
        self.db.read(|conn| load(conn, id))
    }

    pub fn status(&self, id: i64) -> Result<JobStatusReport> {
        Ok(self.job(id)?.status_report())
    }

    pub fn list_active(&self, name: Option<&str>) -> Result<Vec<BatchJob>> {
        let rows = self.db.read(|conn| Ok(batch_repo::list_active(conn, name)?))?;
        rows.into_iter().map(BatchJob::from_row).collect()
    }

    /// The job history view, newest first.
    pub fn query(&self, query: &JobQuery) -> Result<Vec<BatchJob>> {
        let filter = BatchJobFilter {
            id: query.id,
            name: query.name.clone(),
            queued_since: query
                .age_days
                .map(|days| time::format(Utc::now() - chrono::Duration::days(i64::from(days)))),
            status: query.status.map(|s| s.as_str().to_string()),
            limit: query.limit,
        };
        let rows = self.db.read(|conn| Ok(batch_repo::query(conn, &filter)?))?;
        rows.into_iter().map(BatchJob::from_row).collect()
    }

    pub fn transitions(&self, id: i64) -> Result<Vec<Transition>> {
        let rows = self.db.read(|conn| {
            load(conn, id)?;
            Ok(batch_repo::transitions(conn, id)?)
        })?;
        rows.into_iter().map(Transition::from_row).collect()
    }

    /// Marks a job Cancelled. A Running worker notices at its next safe
    /// point and stops; nothing is killed.
    pub fn cancel(&self, id: i64) -> Result<BatchStatus> {
        let job = self.job(id)?;
        self.require_for(&job.command)?;
        let message = format!("cancelled by {}", self.session.user);
        let moved = self.db.with_tx(|tx| {
            let job = load(tx, id)?;
            if job.status.is_terminal() {
                return Err(CdrError::InvariantViolation(format!(
                    "job {} already finished with status {}",
                    id, job.status
                )));
            }
            move_job(tx, &job, BatchStatus::Cancelled, Some(&message), &time::now())
        })?;
        if let Some(moved) = moved {
            self.after_move(&moved, Some(&message));
        }
        Ok(BatchStatus::Cancelled)
    }

    /// Progress report from a worker. `Running` refreshes the heartbeat;
    /// a terminal status finishes the job. Returns the status now stored,
    /// which tells the worker whether it has been cancelled.
    pub fn worker_heartbeat(&self, id: i64, status: BatchStatus, message: Option<&str>) -> Result<BatchStatus> {
        let (moved, current) = self.db.with_tx(|tx| {
            let job = load(tx, id)?;
            let now = time::now();
            match status {
                BatchStatus::Running if job.status == BatchStatus::Running => {
                    batch_repo::heartbeat(tx, id, message, &now)?;
                    Ok((None, BatchStatus::Running))
                }
                BatchStatus::Running | BatchStatus::Queued => Ok((None, job.status)),
                terminal => {
                    let moved = move_job(tx, &job, terminal, message, &now)?;
                    let current = moved.as_ref().map_or(job.status, |m| m.job.status);
                    Ok((moved, current))
                }
            }
        })?;
        if let Some(moved) = moved {
            self.after_move(&moved, message);
        }
        Ok(current)
    }

    /// Counts a retry against a Running job.
    pub fn record_attempt(&self, id: i64) -> Result<()> {
        self.db.with_tx(|tx| Ok(batch_repo::bump_attempts(tx, id)?))
    }

    /// Atomically moves the oldest Queued job for one of `commands` to
    /// Running.
    pub fn claim_next(&self, commands: &[&str]) -> Result<Option<BatchJob>> {
        let moved = self.db.with_tx(|tx| {
            let Some(row) = batch_repo::oldest_queued(tx, commands)? else {
                return Ok(None);
            };
            let job = BatchJob::from_row(row)?;
            move_job(tx, &job, BatchStatus::Running, None, &time::now())
        })?;
        Ok(moved.map(|m| {
            self.after_move(&m, None);
            m.job
        }))
    }

    /// Operator action: fails jobs stuck in Queued or Running. Returns the
    /// ids actually changed.
    pub fn fail_stalled(&self, ids: &[i64]) -> Result<Vec<i64>> {
        self.session.require(Action::SetSysValue)?;
        let message = format!("marked failed by {}", self.session.user);
        let moved = self.db.with_tx(|tx| {
            let now = time::now();
            let mut moved = Vec::new();
            for id in ids {
                let job = load(tx, *id)?;
                if let Some(m) = move_job(tx, &job, BatchStatus::Failure, Some(&message), &now)? {
                    moved.push(m);
                }
            }
            Ok(moved)
        })?;
        for m in &moved {
            self.after_move(m, Some(&message));
        }
        Ok(moved.into_iter().map(|m| m.job.id).collect())
    }

    /// Supervisor sweep: Running jobs without a heartbeat since
    /// `now - stale_after` become Failure.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| CdrError::InvalidInput(format!("stale threshold: {}", e)))?;
        let cutoff = time::format(now - stale_after);
        let moved = self.db.with_tx(|tx| {
            let stamp = time::format(now);
            let mut moved = Vec::new();
            for row in batch_repo::stale_running(tx, &cutoff)? {
                let job = BatchJob::from_row(row)?;
                let message = format!(
                    "no heartbeat since {}",
                    job.last_heartbeat.as_deref().unwrap_or("start")
                );
                if let Some(m) = move_job(tx, &job, BatchStatus::Failure, Some(&message), &stamp)? {
                    moved.push(m);
                }
            }
            Ok(moved)
        })?;
        for m in &moved {
            log::warn!("Job {} '{}' presumed dead, marked Failure", m.job.id, m.job.name);
            self.after_move(m, m.job.progress.as_deref());
        }
        Ok(moved.into_iter().map(|m| m.job.id).collect())
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    fn after_move(&self, moved: &Moved, message: Option<&str>) {
        let job = &moved.job;
        log::info!("Job {} '{}': {} -> {}", job.id, job.name, moved.from, job.status);
        self.broadcast(JobEvent::new(job.id, &job.name, Some(moved.from), job.status, message));
        if job.status.is_terminal() && !job.notify.is_empty() {
            let notification = Notification::for_job(job, self.status_url.as_deref());
            if let Err(e) = self.notifier.send(&notification) {
                log::warn!("Notification for job {} not sent: {}", job.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::notify::RecordingSink;

    fn controller() -> (JobController, Arc<RecordingSink>) {
        let db = Database::open_in_memory().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let controller = JobController::new(db, Session::new("s", "ops", Action::ALL), sink.clone())
            .with_status_url(Some("https://cdr.example/BatchJobStatus?id=".into()));
        (controller, sink)
    }

    fn args(pairs: &[(&str, &str)]) -> JobArgs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_single_flight_per_name() {
        let (jc, _) = controller();
        let first = jc.enqueue("Weekly", "report", args(&[]), vec!["x@y".into()]).unwrap();
        let err = jc.enqueue("Weekly", "report", args(&[]), vec![]).unwrap_err();
        match err {
            CdrError::ConcurrencyConflict { job_name, active_job } => {
                assert_eq!(job_name, "Weekly");
                assert_eq!(active_job, first);
            }
            other => panic!("unexpected {:?}", other),
        }
        jc.enqueue("Monthly", "report", args(&[]), vec![]).unwrap();

        jc.claim_next(&["report"]).unwrap().unwrap();
        jc.worker_heartbeat(first, BatchStatus::Success, Some("done")).unwrap();
        jc.enqueue("Weekly", "report", args(&[]), vec![]).unwrap();
    }

    #[test]
    fn test_claim_and_heartbeat() {
        let (jc, _) = controller();
        let id = jc
            .enqueue("Report", "report", args(&[("days", "7")]), vec![])
            .unwrap();
        assert!(jc.claim_next(&["other"]).unwrap().is_none());

        let job = jc.claim_next(&["report"]).unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, BatchStatus::Running);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.arg("days"), Some("7"));
        assert!(jc.claim_next(&["report"]).unwrap().is_none());

        let now = jc.worker_heartbeat(id, BatchStatus::Running, Some("3 of 10")).unwrap();
        assert_eq!(now, BatchStatus::Running);
        assert_eq!(jc.status(id).unwrap().progress.as_deref(), Some("3 of 10"));
    }

    #[test]
    fn test_cancel_queued_and_running() {
        let (jc, _) = controller();
        let queued = jc.enqueue("A", "report", args(&[]), vec![]).unwrap();
        assert_eq!(jc.cancel(queued).unwrap(), BatchStatus::Cancelled);
        assert_eq!(jc.cancel(queued).unwrap_err().kind(), "InvariantViolation");

        let running = jc.enqueue("B", "report", args(&[]), vec![]).unwrap();
        jc.claim_next(&["report"]).unwrap();
        jc.cancel(running).unwrap();
        // The worker learns about it on its next heartbeat.
        let seen = jc.worker_heartbeat(running, BatchStatus::Running, Some("still going")).unwrap();
        assert_eq!(seen, BatchStatus::Cancelled);
        // A late success report does not overwrite the cancellation.
        let seen = jc.worker_heartbeat(running, BatchStatus::Success, None).unwrap();
        assert_eq!(seen, BatchStatus::Cancelled);
    }

    #[test]
    fn test_transitions_recorded() {
        let (jc, _) = controller();
        let id = jc.enqueue("A", "report", args(&[]), vec![]).unwrap();
        jc.claim_next(&["report"]).unwrap();
        jc.worker_heartbeat(id, BatchStatus::Failure, Some("boom")).unwrap();
        let moves: Vec<(Option<BatchStatus>, BatchStatus)> = jc
            .transitions(id)
            .unwrap()
            .into_iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(
            moves,
            vec![
                (None, BatchStatus::Queued),
                (Some(BatchStatus::Queued), BatchStatus::Running),
                (Some(BatchStatus::Running), BatchStatus::Failure),
            ]
        );
        let status = jc.status(id).unwrap();
        assert!(status.completed_at.is_some());
        assert_eq!(status.progress.as_deref(), Some("boom"));
    }

    #[test]
    fn test_terminal_notification() {
        let (jc, sink) = controller();
        let id = jc.enqueue("Weekly", "report", args(&[]), vec!["x@y".into(), " ".into()]).unwrap();
        let quiet = jc.enqueue("Quiet", "report", args(&[]), vec![]).unwrap();
        jc.claim_next(&["report"]).unwrap();
        assert!(sink.sent().is_empty());
        jc.worker_heartbeat(id, BatchStatus::Success, Some("42 documents")).unwrap();
        jc.cancel(quiet).unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["x@y"]);
        assert!(sent[0].subject.contains("Success"));
        assert!(sent[0].body.contains("42 documents"));
        assert!(sent[0].body.contains(&format!("BatchJobStatus?id={}", id)));
    }

    #[test]
    fn test_sweep_stale() {
        let (jc, sink) = controller();
        let id = jc.enqueue("Weekly", "report", args(&[]), vec!["x@y".into()]).unwrap();
        jc.claim_next(&["report"]).unwrap();

        assert!(jc.sweep_stale(Utc::now()).unwrap().is_empty());
        let later = Utc::now() + chrono::Duration::seconds(601);
        assert_eq!(jc.sweep_stale(later).unwrap(), vec![id]);
        assert_eq!(jc.status(id).unwrap().status, BatchStatus::Failure);
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn test_fail_stalled_requires_right() {
        let (jc, _) = controller();
        let id = jc.enqueue("Weekly", "report", args(&[]), vec![]).unwrap();
        let ops = JobController::new(
            jc.db.clone(),
            Session::new("t", "viewer", Vec::<Action>::new()),
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(ops.fail_stalled(&[id]).unwrap_err().kind(), "PermissionDenied");
        assert_eq!(jc.fail_stalled(&[id]).unwrap(), vec![id]);
        assert!(jc.fail_stalled(&[id]).unwrap().is_empty());
    }

    #[test]
    fn test_publish_needs_publishing_right() {
        let (jc, _) = controller();
        let editor = JobController::new(
            jc.db.clone(),
            Session::new("t", "editor", [Action::ModifyDocument]),
            Arc::new(RecordingSink::default()),
        );
        let err = editor
            .enqueue("Publishing", PUBLISH_COMMAND, args(&[]), vec![])
            .unwrap_err();
        assert_eq!(err.kind(), "PermissionDenied");
        editor.enqueue("Report", "report", args(&[]), vec![]).unwrap();
    }

    #[test]
    fn test_query_and_list_active() {
        let (jc, _) = controller();
        let a = jc.enqueue("A", "report", args(&[]), vec![]).unwrap();
        let b = jc.enqueue("B", "report", args(&[]), vec![]).unwrap();
        jc.cancel(a).unwrap();

        let active: Vec<i64> = jc.list_active(None).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(active, vec![b]);
        assert!(jc.list_active(Some("A")).unwrap().is_empty());

        let cancelled = jc
            .query(&JobQuery {
                status: Some(BatchStatus::Cancelled),
                age_days: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a);
        assert_eq!(jc.job(999).unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn test_events_broadcast() {
        let (jc, _) = controller();
        let events = JobEventBroadcaster::new(16);
        let mut rx = events.subscribe();
        let jc = jc.with_events(events);
        let id = jc.enqueue("A", "report", args(&[]), vec![]).unwrap();
        jc.claim_next(&["report"]).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!((first.job_id, first.from, first.to), (id, None, BatchStatus::Queued));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.to, BatchStatus::Running);
    }
}
