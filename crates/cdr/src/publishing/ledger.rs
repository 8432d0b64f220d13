use super::{LastPublication, PubJobStatus, PublicationEvent, PublicationJob};
use crate::db::{pub_repo, Database};
use crate::error::{CdrError, Result};
use crate::ids::DocId;
use crate::session::{Action, Session};
use crate::time;

/// Read projection over the rows publishing workers write.
#[derive(Clone)]
pub struct PublicationLedger {
    db: Database,
    session: Session,
}

impl PublicationLedger {
    pub fn new(db: Database, session: Session) -> Self {
        Self { db, session }
    }

    /// All events for a document in chronological order.
    pub fn events_for_doc(&self, doc_id: DocId) -> Result<Vec<PublicationEvent>> {
        let rows = self.db.with_conn(|conn| pub_repo::events_for_doc(conn, doc_id))?;
        rows.into_iter().map(PublicationEvent::from_row).collect()
    }

    pub fn events_for_job(&self, job_id: i64) -> Result<Vec<PublicationEvent>> {
        let rows = self.db.with_conn(|conn| pub_repo::events_for_job(conn, job_id))?;
        rows.into_iter().map(PublicationEvent::from_row).collect()
    }

    /// Latest successful push of the document, if any.
    pub fn last_publication(&self, doc_id: DocId) -> Result<Option<LastPublication>> {
        let events = self.events_for_doc(doc_id)?;
        Ok(events
            .into_iter()
            .rev()
            .find(|e| e.succeeded() && e.is_push() && !e.removed)
            .map(|e| LastPublication {
                job_id: e.job_id,
                started_at: e.started_at,
                doc_version: e.doc_version,
            }))
    }

    /// Latest successful removal of the document from the public site.
    pub fn last_removal(&self, doc_id: DocId) -> Result<Option<PublicationEvent>> {
        let events = self.events_for_doc(doc_id)?;
        Ok(events
            .into_iter()
            .rev()
            .find(|e| e.succeeded() && e.is_push() && e.removed))
    }

    /// Earliest successful Full-Load job started after `job_id`.
    pub fn first_full_load_after(&self, job_id: i64) -> Result<Option<PublicationJob>> {
        let row = self
            .db
            .with_conn(|conn| pub_repo::first_full_load_after(conn, job_id))?;
        row.map(PublicationJob::from_row).transpose()
    }

    pub fn in_public_projection(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.projection_version(doc_id)?.is_some())
    }

    /// Version of the document currently on the public site.
    pub fn projection_version(&self, doc_id: DocId) -> Result<Option<u32>> {
        let entry = self
            .db
            .with_conn(|conn| pub_repo::projection_entry(conn, doc_id))?;
        Ok(entry.map(|(_, version)| version))
    }

    pub fn job(&self, job_id: i64) -> Result<PublicationJob> {
        let row = self
            .db
            .with_conn(|conn| pub_repo::find_job(conn, job_id))?
            .ok_or_else(|| CdrError::not_found("Publishing job", job_id))?;
        PublicationJob::from_row(row)
    }

    /// Jobs still Pending or InProgress, oldest first.
    pub fn unfinished_jobs(&self) -> Result<Vec<PublicationJob>> {
        let rows = self.db.with_conn(pub_repo::unfinished_jobs)?;
        rows.into_iter().map(PublicationJob::from_row).collect()
    }

    /// Operator status change for a stuck publishing job.
    ///
    /// Only `Failure` and `InProgress` may be set, and only on jobs that
    /// have not finished.
    pub fn set_job_status(
        &self,
        job_id: i64,
        status: PubJobStatus,
        message: Option<&str>,
    ) -> Result<()> {
        self.session.require(Action::UsePublishingSystem)?;
        if !matches!(status, PubJobStatus::Failure | PubJobStatus::InProgress) {
            return Err(CdrError::InvalidInput(format!(
                "status {} cannot be set by an operator",
                status
            )));
        }
        let user = self.session.user.clone();
        self.db.with_tx(|tx| {
            let job = pub_repo::find_job(tx, job_id)?
                .ok_or_else(|| CdrError::not_found("Publishing job", job_id))?;
            let current = PubJobStatus::parse(&job.status)?;
            if current.is_finished() {
                return Err(CdrError::InvariantViolation(format!(
                    "publishing job {} already finished with status {}",
                    job_id, current
                )));
            }
            let completed = (status == PubJobStatus::Failure).then(time::now);
            let note = format!(
                "Status set to {} by {}{}",
                status,
                user,
                message.map(|m| format!(": {}", m)).unwrap_or_default()
            );
            pub_repo::set_job_status(tx, job_id, status.as_str(), completed.as_deref(), Some(&note))?;
            Ok(())
        })?;
        log::info!("Publishing job {} set to {}", job_id, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::doc_repo;

    fn setup() -> (PublicationLedger, DocId) {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .with_conn(|conn| {
                doc_repo::insert(conn, "Summary", "T", "<Summary/>", "2024-01-01T00:00:00.000000Z", "u")
            })
            .unwrap();
        (PublicationLedger::new(db, Session::system()), id)
    }

    #[test]
    fn test_last_publication_ignores_failures_removals_and_exports() {
        let (ledger, id) = setup();
        ledger
            .db
            .with_conn(|conn| {
                let ok = pub_repo::insert_job(conn, "Export", "", "u", "Success", "2024-01-01T00:00:00.000000Z")?;
                pub_repo::insert_doc_event(conn, ok, id, 1, false, false, None)?;
                let failed_doc = pub_repo::insert_job(conn, "Export", "", "u", "Success", "2024-01-02T00:00:00.000000Z")?;
                pub_repo::insert_doc_event(conn, failed_doc, id, 2, false, true, None)?;
                let failed_job = pub_repo::insert_job(conn, "Export", "", "u", "Failure", "2024-01-03T00:00:00.000000Z")?;
                pub_repo::insert_doc_event(conn, failed_job, id, 3, false, false, None)?;
                let removal = pub_repo::insert_job(conn, "Export", "", "u", "Success", "2024-01-04T00:00:00.000000Z")?;
                pub_repo::insert_doc_event(conn, removal, id, 3, true, false, None)?;
                let export = pub_repo::insert_job(conn, "Interim-Export", "/out/dir", "u", "Success", "2024-01-05T00:00:00.000000Z")?;
                pub_repo::insert_doc_event(conn, export, id, 4, false, false, None)?;
                Ok(())
            })
            .unwrap();

        let last = ledger.last_publication(id).unwrap().unwrap();
        assert_eq!(last.doc_version, 1);
        assert_eq!(ledger.events_for_doc(id).unwrap().len(), 5);
        let removal = ledger.last_removal(id).unwrap().unwrap();
        assert_eq!(removal.label(), "2024-01-04(C-4)R");
    }

    #[test]
    fn test_set_job_status_rules() {
        let (ledger, _) = setup();
        let job = ledger
            .db
            .with_conn(|conn| pub_repo::insert_job(conn, "Export", "", "u", "InProgress", "2024-01-01T00:00:00.000000Z"))
            .unwrap();

        assert_eq!(
            ledger.set_job_status(job, PubJobStatus::Success, None).unwrap_err().kind(),
            "InvalidInput"
        );
        ledger.set_job_status(job, PubJobStatus::Failure, Some("stuck")).unwrap();
        let row = ledger.job(job).unwrap();
        assert_eq!(row.status, PubJobStatus::Failure);
        assert!(row.completed_at.is_some());
        assert!(row.messages.unwrap().contains("stuck"));
        assert_eq!(
            ledger.set_job_status(job, PubJobStatus::InProgress, None).unwrap_err().kind(),
            "InvariantViolation"
        );
        assert_eq!(ledger.job(job + 1).unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn test_set_job_status_requires_right() {
        let db = Database::open_in_memory().unwrap();
        let ledger = PublicationLedger::new(db, Session::new("s", "clerk", Vec::<Action>::new()));
        let err = ledger.set_job_status(1, PubJobStatus::Failure, None).unwrap_err();
        assert_eq!(err.kind(), "PermissionDenied");
    }
}
