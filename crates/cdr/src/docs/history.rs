//! The version history report: versions annotated with publication events,
//! plus the removal date of blocked documents.

use serde::{Deserialize, Serialize};

use super::store::DocumentStore;
use super::{ActiveStatus, VersionInfo};
use crate::error::Result;
use crate::ids::DocId;
use crate::publishing::{PublicationEvent, PublicationLedger};
use crate::time;

/// When (or whether) a blocked document left the public site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalStatus {
    /// Removal date (`YYYY-MM-DD`).
    Removed(String),
    NeverPublished,
    /// Still public; a new version is needed before it can be withdrawn.
    NeedsVersioning,
    NotYetRemoved,
    /// No event explains the removal. Usually a sign of bad ledger data.
    CannotDetermine,
}

impl RemovalStatus {
    pub fn describe(&self) -> String {
        match self {
            RemovalStatus::Removed(date) => date.clone(),
            RemovalStatus::NeverPublished => "never published".to_string(),
            RemovalStatus::NeedsVersioning => "needs versioning to be removed".to_string(),
            RemovalStatus::NotYetRemoved => "not yet removed".to_string(),
            RemovalStatus::CannotDetermine => "cannot determine".to_string(),
        }
    }
}

/// Inputs the removal resolver looks at, gathered from the ledger.
pub struct RemovalFacts<'a> {
    /// Successful events for the document, chronological. Vendor exports
    /// are skipped by the resolver.
    pub events: &'a [PublicationEvent],
    /// Whether the document is in the public projection.
    pub in_projection: bool,
    pub latest_version: Option<u32>,
}

/// Resolves the removal status of a blocked document.
///
/// `full_load_after` looks up the start time of the first successful
/// Full-Load job after the given job.
pub fn resolve_removal<F>(facts: &RemovalFacts<'_>, full_load_after: F) -> Result<RemovalStatus>
where
    F: FnOnce(i64) -> Result<Option<String>>,
{
    let pushes: Vec<&PublicationEvent> = facts.events.iter().filter(|e| e.is_push()).collect();
    if let Some(removal) = pushes.iter().rev().find(|e| e.removed) {
        return Ok(RemovalStatus::Removed(
            time::date_part(&removal.started_at).to_string(),
        ));
    }
    let last_push = match pushes.iter().rev().find(|e| !e.removed) {
        Some(e) => e,
        None => return Ok(RemovalStatus::NeverPublished),
    };
    if facts.in_projection {
        let needs_version = facts
            .latest_version
            .is_some_and(|latest| latest > last_push.doc_version);
        return Ok(if needs_version {
            RemovalStatus::NeedsVersioning
        } else {
            RemovalStatus::NotYetRemoved
        });
    }
    match full_load_after(last_push.job_id)? {
        Some(started) => Ok(RemovalStatus::Removed(time::date_part(&started).to_string())),
        None => Ok(RemovalStatus::CannotDetermine),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistoryRow {
    pub version: VersionInfo,
    /// Labels such as `2024-01-05(C-17)` for every successful event that
    /// carried this version.
    pub publications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistory {
    pub doc_id: DocId,
    pub doc_type: String,
    pub title: String,
    pub active_status: ActiveStatus,
    pub created_at: String,
    pub created_by: String,
    pub modified_at: Option<String>,
    pub modified_by: Option<String>,
    /// Set only for blocked documents.
    pub removal: Option<RemovalStatus>,
    /// Newest version first.
    pub versions: Vec<VersionHistoryRow>,
}

impl DocumentStore {
    /// Assembles the version history report for a document.
    pub fn version_history(&self, doc_id: DocId, ledger: &PublicationLedger) -> Result<VersionHistory> {
        let doc = self.get_doc(doc_id, crate::ids::VersionSelector::Current)?;
        let events: Vec<PublicationEvent> = ledger
            .events_for_doc(doc_id)?
            .into_iter()
            .filter(|e| e.succeeded())
            .collect();

        let versions = self
            .list_versions(doc_id)?
            .map(|v| {
                v.map(|version| VersionHistoryRow {
                    publications: events
                        .iter()
                        .filter(|e| e.doc_version == version.num)
                        .map(PublicationEvent::label)
                        .collect(),
                    version,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let removal = if doc.is_blocked() {
            let facts = RemovalFacts {
                events: &events,
                in_projection: ledger.in_public_projection(doc_id)?,
                latest_version: versions.first().map(|r| r.version.num),
            };
            Some(resolve_removal(&facts, |job_id| {
                Ok(ledger.first_full_load_after(job_id)?.map(|j| j.started_at))
            })?)
        } else {
            None
        };

        Ok(VersionHistory {
            doc_id,
            doc_type: doc.doc_type,
            title: doc.title,
            active_status: doc.active_status,
            created_at: doc.created_at,
            created_by: doc.created_by,
            modified_at: doc.modified_at,
            modified_by: doc.modified_by,
            removal,
            versions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishing::PubJobStatus;

    fn ev(job_id: i64, version: u32, removed: bool, started: &str) -> PublicationEvent {
        PublicationEvent {
            job_id,
            doc_id: 99,
            doc_version: version,
            removed,
            failure: false,
            started_at: started.to_string(),
            output_dir: None,
            subset: "Interim-Export".to_string(),
            job_status: PubJobStatus::Success,
        }
    }

    fn no_full_load(_: i64) -> Result<Option<String>> {
        Ok(None)
    }

    #[test]
    fn test_removal_event_wins() {
        let events = [
            ev(1, 1, false, "2024-01-01T00:00:00.000000Z"),
            ev(2, 1, true, "2024-02-03T00:00:00.000000Z"),
        ];
        let facts = RemovalFacts {
            events: &events,
            in_projection: true,
            latest_version: Some(4),
        };
        assert_eq!(
            resolve_removal(&facts, no_full_load).unwrap(),
            RemovalStatus::Removed("2024-02-03".into())
        );
    }

    #[test]
    fn test_never_published() {
        let facts = RemovalFacts {
            events: &[],
            in_projection: false,
            latest_version: Some(2),
        };
        assert_eq!(resolve_removal(&facts, no_full_load).unwrap(), RemovalStatus::NeverPublished);
    }

    #[test]
    fn test_in_projection() {
        let events = [ev(1, 3, false, "2024-01-01T00:00:00.000000Z")];
        let needs = RemovalFacts {
            events: &events,
            in_projection: true,
            latest_version: Some(5),
        };
        assert_eq!(resolve_removal(&needs, no_full_load).unwrap(), RemovalStatus::NeedsVersioning);
        let current = RemovalFacts {
            events: &events,
            in_projection: true,
            latest_version: Some(3),
        };
        assert_eq!(resolve_removal(&current, no_full_load).unwrap(), RemovalStatus::NotYetRemoved);
    }

    #[test]
    fn test_full_load_then_cannot_determine() {
        let events = [ev(7, 3, false, "2024-01-01T00:00:00.000000Z")];
        let facts = RemovalFacts {
            events: &events,
            in_projection: false,
            latest_version: Some(3),
        };
        let found = resolve_removal(&facts, |job| {
            assert_eq!(job, 7);
            Ok(Some("2024-03-09T01:00:00.000000Z".to_string()))
        })
        .unwrap();
        assert_eq!(found, RemovalStatus::Removed("2024-03-09".into()));
        assert_eq!(resolve_removal(&facts, no_full_load).unwrap(), RemovalStatus::CannotDetermine);
    }

    #[test]
    fn test_vendor_exports_are_not_pushes() {
        let mut export = ev(4, 1, false, "2024-01-01T00:00:00.000000Z");
        export.output_dir = Some("/out/dir".to_string());
        let events = [export];
        let facts = RemovalFacts {
            events: &events,
            in_projection: false,
            latest_version: Some(1),
        };
        let found = resolve_removal(&facts, |_| Ok(Some("2024-02-01T00:00:00.000000Z".to_string())))
            .unwrap();
        assert_eq!(found, RemovalStatus::NeverPublished);

        let mut removal_export = ev(5, 1, true, "2024-01-02T00:00:00.000000Z");
        removal_export.output_dir = Some("/out/dir".to_string());
        let push = ev(6, 1, false, "2024-01-03T00:00:00.000000Z");
        let events = [removal_export, push];
        let facts = RemovalFacts {
            events: &events,
            in_projection: true,
            latest_version: Some(1),
        };
        assert_eq!(resolve_removal(&facts, no_full_load).unwrap(), RemovalStatus::NotYetRemoved);
    }

    #[test]
    fn test_describe() {
        assert_eq!(RemovalStatus::NeedsVersioning.describe(), "needs versioning to be removed");
        assert_eq!(RemovalStatus::Removed("2024-01-02".into()).describe(), "2024-01-02");
    }
}
