//! Ledger writes. Only the publishing worker calls these.

use super::PubJobStatus;
use crate::db::{pub_repo, Database};
use crate::error::Result;
use crate::ids::DocId;
use crate::time;

#[derive(Clone)]
pub struct LedgerWriter {
    db: Database,
}

impl LedgerWriter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens an InProgress publication job. An empty `output_dir` marks a
    /// push-only job.
    pub fn create_job(&self, subset: &str, output_dir: Option<&str>, user: &str) -> Result<i64> {
        let id = self.db.with_conn(|conn| {
            pub_repo::insert_job(
                conn,
                subset,
                output_dir.unwrap_or(""),
                user,
                PubJobStatus::InProgress.as_str(),
                &time::now(),
            )
        })?;
        log::info!("Opened publication job {} for subset {}", id, subset);
        Ok(id)
    }

    pub fn record_event(
        &self,
        job_id: i64,
        doc_id: DocId,
        doc_version: u32,
        removed: bool,
        failure: Option<&str>,
    ) -> Result<()> {
        self.db.with_conn(|conn| {
            pub_repo::insert_doc_event(
                conn,
                job_id,
                doc_id,
                doc_version,
                removed,
                failure.is_some(),
                failure,
            )
        })?;
        Ok(())
    }

    /// Records a successful push and the body now on the public site, in
    /// one transaction.
    pub fn record_push(&self, job_id: i64, doc_id: DocId, doc_version: u32, xml: &str) -> Result<()> {
        self.db.with_tx(|tx| {
            pub_repo::insert_doc_event(tx, job_id, doc_id, doc_version, false, false, None)?;
            pub_repo::upsert_projection(tx, doc_id, job_id, doc_version, xml)?;
            Ok(())
        })
    }

    /// Records a withdrawal and drops the document from the public site.
    pub fn record_removal(&self, job_id: i64, doc_id: DocId, doc_version: u32) -> Result<()> {
        self.db.with_tx(|tx| {
            pub_repo::insert_doc_event(tx, job_id, doc_id, doc_version, true, false, None)?;
            pub_repo::remove_projection(tx, doc_id)?;
            Ok(())
        })
    }

    pub fn projection_ids(&self) -> Result<Vec<DocId>> {
        Ok(self.db.with_conn(pub_repo::projection_ids)?)
    }

    pub fn finish_job(&self, job_id: i64, status: PubJobStatus, message: Option<&str>) -> Result<()> {
        let now = time::now();
        self.db.with_conn(|conn| {
            pub_repo::set_job_status(conn, job_id, status.as_str(), Some(&now), message)
        })?;
        log::info!("Publication job {} finished: {}", job_id, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::doc_repo;
    use crate::publishing::PublicationLedger;
    use crate::session::Session;

    #[test]
    fn test_push_then_remove() {
        let db = Database::open_in_memory().unwrap();
        let doc = db
            .with_conn(|conn| {
                doc_repo::insert(conn, "Summary", "T", "<Summary/>", "2024-01-01T00:00:00.000000Z", "u")
            })
            .unwrap();
        let writer = LedgerWriter::new(db.clone());
        let ledger = PublicationLedger::new(db, Session::system());

        let push = writer.create_job("Interim-Export", None, "ops").unwrap();
        writer.record_push(push, doc, 1, "<Summary/>").unwrap();
        writer.finish_job(push, PubJobStatus::Success, None).unwrap();
        assert_eq!(ledger.projection_version(doc).unwrap(), Some(1));
        assert!(ledger.job(push).unwrap().is_push_only());

        let removal = writer.create_job("Interim-Export", None, "ops").unwrap();
        writer.record_removal(removal, doc, 1).unwrap();
        writer.finish_job(removal, PubJobStatus::Success, None).unwrap();
        assert!(!ledger.in_public_projection(doc).unwrap());
        assert!(writer.projection_ids().unwrap().is_empty());

        let events = ledger.events_for_doc(doc).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].removed);
    }

    #[test]
    fn test_failed_event_carries_message() {
        let db = Database::open_in_memory().unwrap();
        let doc = db
            .with_conn(|conn| {
                doc_repo::insert(conn, "Summary", "T", "<Summary/>", "2024-01-01T00:00:00.000000Z", "u")
            })
            .unwrap();
        let writer = LedgerWriter::new(db.clone());
        let job = writer.create_job("Export", Some("/tmp/out"), "ops").unwrap();
        writer.record_event(job, doc, 1, false, Some("filter failed")).unwrap();
        let ledger = PublicationLedger::new(db, Session::system());
        let events = ledger.events_for_job(job).unwrap();
        assert!(events[0].failure);
        assert!(!events[0].succeeded());
        assert_eq!(events[0].output_dir.as_deref(), Some("/tmp/out"));
    }
}
