//! Document store, version history and link index.

mod common;

use std::collections::BTreeSet;
use std::thread;

use common::{summary_xml, TestHarness};

use cdr::docs::{ActiveStatus, CreateVersion, IndexQuery, IndexTerm, RemovalStatus, SaveOptions};
use cdr::publishing::{PubJobStatus, FULL_LOAD_SUBSET};
use cdr::session::Action;
use cdr::{CdrError, DocId, Session, VersionSelector, Wildcard};

fn version_numbers(h: &TestHarness, id: DocId) -> Vec<u32> {
    h.store()
        .list_versions(id)
        .unwrap()
        .map(|v| v.unwrap().num)
        .collect()
}

#[test]
fn test_new_document_then_forced_version() {
    let h = TestHarness::new();
    let store = h.store();
    let id = h.add_doc("Summary", &summary_xml("Adult Brain Tumors", &[]));

    let versions: Vec<_> = store.list_versions(id).unwrap().map(Result::unwrap).collect();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].num, 1);

    let doc = store.get_doc(id, VersionSelector::Current).unwrap();
    store
        .save_doc(&doc, &SaveOptions::versioned("second pass"))
        .unwrap();

    let versions: Vec<_> = store.list_versions(id).unwrap().map(Result::unwrap).collect();
    assert_eq!(versions.iter().map(|v| v.num).collect::<Vec<_>>(), vec![2, 1]);
    assert!(versions[0].created_at > versions[1].created_at);
    assert_eq!(versions[0].comment.as_deref(), Some("second pass"));
}

#[test]
fn test_concurrent_saves_number_versions_without_gaps() {
    let h = TestHarness::new();
    let id = h.add_doc("Summary", &summary_xml("Concurrency", &[]));

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let store = h.ctx.documents();
            thread::spawn(move || {
                for i in 0..5 {
                    let mut doc = store.get_doc(id, VersionSelector::Current).unwrap();
                    doc.xml = summary_xml(&format!("Concurrency {} {}", n, i), &[]);
                    store
                        .save_doc(&doc, &SaveOptions::versioned("parallel"))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let nums = version_numbers(&h, id);
    assert_eq!(nums.len(), 21);
    let expected: BTreeSet<u32> = (1..=21).collect();
    assert_eq!(nums.iter().copied().collect::<BTreeSet<_>>(), expected);
}

#[test]
fn test_round_trip_save_changes_nothing() {
    let h = TestHarness::new();
    let store = h.store();
    let id = h.add_doc("Summary", &summary_xml("Stable", &[]));
    h.add_version(id, &summary_xml("Stable", &[]), true);

    let before = store.get_doc(id, VersionSelector::Current).unwrap();
    let versions_before = version_numbers(&h, id);
    let outcome = store
        .save_doc(
            &before,
            &SaveOptions {
                create_version: CreateVersion::Never,
                check_in: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(outcome.version, None);

    let after = store.get_doc(id, VersionSelector::Current).unwrap();
    assert_eq!(after.xml, before.xml);
    assert_eq!(version_numbers(&h, id), versions_before);
}

#[test]
fn test_version_selectors() {
    let h = TestHarness::new();
    let store = h.store();
    let id = h.add_doc("Summary", &summary_xml("Selectors", &[]));

    let err = store.get_doc(id, VersionSelector::LastPublishable).unwrap_err();
    assert!(matches!(err, CdrError::NoPublishableVersion(_)));

    h.add_version(id, &summary_xml("Selectors v2", &[]), true);
    h.add_version(id, &summary_xml("Selectors v3", &[]), false);

    assert_eq!(store.get_doc(id, VersionSelector::Last).unwrap().version, Some(3));
    let lastp = store.get_doc(id, VersionSelector::LastPublishable).unwrap();
    assert_eq!(lastp.version, Some(2));
    assert_eq!(lastp.title, "Selectors v2");
    assert_eq!(store.get_doc(id, VersionSelector::Current).unwrap().version, None);

    let err = store.get_doc(id, VersionSelector::Number(9)).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    let err = store.get_doc(id + 1000, VersionSelector::Current).unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn test_validation_errors_block_the_save() {
    let h = TestHarness::new();
    let store = h.store();
    let id = h.add_doc("Summary", &summary_xml("Valid", &[]));
    let mut doc = store.get_doc(id, VersionSelector::Current).unwrap();
    doc.xml = "<Term><Name>wrong root</Name></Term>".to_string();

    let err = store
        .save_doc(
            &doc,
            &SaveOptions {
                validate: true,
                ..SaveOptions::versioned("bad")
            },
        )
        .unwrap_err();
    match err {
        CdrError::ValidationErrors(messages) => assert!(!messages.is_empty()),
        other => panic!("expected ValidationErrors, got {:?}", other),
    }
    assert_eq!(version_numbers(&h, id), vec![1]);
}

#[test]
fn test_rights_are_checked() {
    let h = TestHarness::with_actions(vec![Action::AddDocument]);
    let id = h.add_doc("Summary", &summary_xml("Read only", &[]));
    let store = h.store();
    let doc = store.get_doc(id, VersionSelector::Current).unwrap();
    let err = store.save_doc(&doc, &SaveOptions::default()).unwrap_err();
    assert!(matches!(err, CdrError::PermissionDenied(_)));
    assert_eq!(err.user_message(), "You are not authorized to perform this action");
}

#[test]
fn test_check_out_blocks_other_users() {
    let h = TestHarness::new();
    let id = h.add_doc("Summary", &summary_xml("Locked", &[]));
    h.store().check_out(id).unwrap();

    let other = h
        .ctx
        .for_session(Session::new("other-session", "someone-else", Action::ALL))
        .documents();
    let doc = other.get_doc(id, VersionSelector::Current).unwrap();
    let err = other.save_doc(&doc, &SaveOptions::default()).unwrap_err();
    assert_eq!(err.kind(), "InvariantViolation");

    h.store().check_in(id).unwrap();
    other.save_doc(&doc, &SaveOptions::default()).unwrap();
}

#[test]
fn test_blocked_document_still_public_needs_versioning() {
    let h = TestHarness::new();
    let store = h.store();
    let writer = h.ctx.ledger_writer();
    let ledger = h.ctx.ledger();

    let id = h.add_doc("Summary", &summary_xml("Withdrawn", &[]));
    h.add_version(id, &summary_xml("Withdrawn v2", &[]), false);
    let v3 = h.add_version(id, &summary_xml("Withdrawn v3", &[]), true);
    assert_eq!(v3, 3);

    let job = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_push(job, id, 3, "<Summary/>").unwrap();
    writer.finish_job(job, PubJobStatus::Success, None).unwrap();

    h.add_version(id, &summary_xml("Withdrawn v4", &[]), false);
    h.add_version(id, &summary_xml("Withdrawn v5", &[]), false);
    store.set_active_status(id, ActiveStatus::Inactive, Some("retired")).unwrap();

    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NeedsVersioning));
    assert_eq!(
        history.removal.as_ref().map(RemovalStatus::describe).as_deref(),
        Some("needs versioning to be removed")
    );
    let v3_row = history.versions.iter().find(|r| r.version.num == 3).unwrap();
    assert_eq!(v3_row.publications.len(), 1);
    assert!(v3_row.publications[0].ends_with(&format!("(C-{})", job)));
    assert_eq!(history.versions.first().map(|r| r.version.num), Some(5));
}

#[test]
fn test_vendor_export_is_not_a_push() {
    let h = TestHarness::new();
    let store = h.store();
    let writer = h.ctx.ledger_writer();
    let ledger = h.ctx.ledger();

    let id = h.add_doc("Summary", &summary_xml("Exported only", &[]));
    let export = writer.create_job("Interim-Export", Some("/out/dir"), "tester").unwrap();
    writer.record_event(export, id, 1, false, None).unwrap();
    writer.finish_job(export, PubJobStatus::Success, None).unwrap();
    store.set_active_status(id, ActiveStatus::Inactive, None).unwrap();

    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NeverPublished));
    assert_eq!(history.versions[0].publications.len(), 1);
    assert!(history.versions[0].publications[0].ends_with(&format!("(V-{})", export)));
    assert!(ledger.last_publication(id).unwrap().is_none());

    // A later full load does not explain the absence of a document that was
    // never pushed.
    let full = writer.create_job(FULL_LOAD_SUBSET, None, "tester").unwrap();
    writer.finish_job(full, PubJobStatus::Success, None).unwrap();
    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NeverPublished));
}

#[test]
fn test_export_after_push_does_not_hide_newer_versions() {
    let h = TestHarness::new();
    let store = h.store();
    let writer = h.ctx.ledger_writer();
    let ledger = h.ctx.ledger();

    let id = h.add_doc("Summary", &summary_xml("Mixed", &[]));
    h.add_version(id, &summary_xml("Mixed v2", &[]), true);
    h.add_version(id, &summary_xml("Mixed v3", &[]), true);

    let push = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_push(push, id, 2, "<Summary/>").unwrap();
    writer.finish_job(push, PubJobStatus::Success, None).unwrap();
    let export = writer.create_job("Interim-Export", Some("/out/dir"), "tester").unwrap();
    writer.record_event(export, id, 3, false, None).unwrap();
    writer.finish_job(export, PubJobStatus::Success, None).unwrap();
    store.set_active_status(id, ActiveStatus::Inactive, None).unwrap();

    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NeedsVersioning));
    let v3 = history.versions.iter().find(|r| r.version.num == 3).unwrap();
    assert_eq!(v3.publications.len(), 1);
    assert!(v3.publications[0].ends_with(&format!("(V-{})", export)));
    let v2 = history.versions.iter().find(|r| r.version.num == 2).unwrap();
    assert!(v2.publications[0].ends_with(&format!("(C-{})", push)));
    assert_eq!(ledger.last_publication(id).unwrap().map(|p| p.doc_version), Some(2));
}

#[test]
fn test_failed_events_left_out_of_history() {
    let h = TestHarness::new();
    let store = h.store();
    let writer = h.ctx.ledger_writer();
    let ledger = h.ctx.ledger();

    let id = h.add_doc("Summary", &summary_xml("Flaky", &[]));
    h.add_version(id, &summary_xml("Flaky v2", &[]), true);

    let broken = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_event(broken, id, 2, false, Some("filter failed")).unwrap();
    writer.finish_job(broken, PubJobStatus::Success, None).unwrap();
    let aborted = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_event(aborted, id, 2, false, None).unwrap();
    writer.finish_job(aborted, PubJobStatus::Failure, Some("engine down")).unwrap();
    let good = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_push(good, id, 2, "<Summary/>").unwrap();
    writer.finish_job(good, PubJobStatus::Success, None).unwrap();

    assert_eq!(ledger.events_for_doc(id).unwrap().len(), 3);
    let history = store.version_history(id, &ledger).unwrap();
    let v2 = history.versions.iter().find(|r| r.version.num == 2).unwrap();
    assert_eq!(v2.publications.len(), 1);
    assert!(v2.publications[0].ends_with(&format!("(C-{})", good)));
    assert_eq!(history.removal, None);
}

#[test]
fn test_removal_and_full_load_dates() {
    let h = TestHarness::new();
    let store = h.store();
    let writer = h.ctx.ledger_writer();
    let ledger = h.ctx.ledger();

    let id = h.add_doc("Summary", &summary_xml("Removed", &[]));
    h.add_version(id, &summary_xml("Removed v2", &[]), true);
    store.set_active_status(id, ActiveStatus::Inactive, None).unwrap();

    // Blocked and never published.
    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NeverPublished));

    let push = writer.create_job("Interim-Export", None, "tester").unwrap();
    writer.record_push(push, id, 2, "<Summary/>").unwrap();
    writer.finish_job(push, PubJobStatus::Success, None).unwrap();
    let history = store.version_history(id, &ledger).unwrap();
    assert_eq!(history.removal, Some(RemovalStatus::NotYetRemoved));

    let full = writer.create_job(FULL_LOAD_SUBSET, None, "tester").unwrap();
    writer.record_removal(full, id, 2).unwrap();
    writer.finish_job(full, PubJobStatus::Success, None).unwrap();
    let history = store.version_history(id, &ledger).unwrap();
    match history.removal {
        Some(RemovalStatus::Removed(date)) => assert_eq!(date.len(), 10),
        other => panic!("expected a removal date, got {:?}", other),
    }
    assert!(!ledger.in_public_projection(id).unwrap());
    assert_eq!(ledger.last_publication(id).unwrap().map(|p| p.job_id), Some(push));
}

#[test]
fn test_link_index_queries() {
    let h = TestHarness::new();
    let target = h.add_doc("Summary", &summary_xml("Target", &[]));
    let linker = h.add_doc("Summary", &summary_xml("Linker", &[target]));
    h.add_doc("Term", "<Term><Name>unrelated</Name></Term>");
    let store = h.store();

    assert_eq!(store.linking_docs(target).unwrap(), vec![linker]);

    let by_title = IndexQuery {
        terms: vec![IndexTerm::path("/Summary/SummaryTitle").value_like(Wildcard::new("Link%"))],
        doc_type: Some("Summary".to_string()),
        ..Default::default()
    };
    assert_eq!(store.query_index(&by_title).unwrap(), vec![linker]);

    let found = store.find_by_title(&Wildcard::new("tar%"), None, 10).unwrap();
    assert_eq!(found.iter().map(|d| d.id).collect::<Vec<_>>(), vec![target]);
}

#[test]
fn test_unpublished_changes_lists_edited_documents() {
    let h = TestHarness::new();
    let store = h.store();
    let edited = h.add_doc("Summary", &summary_xml("Edited", &[]));
    h.add_version(edited, &summary_xml("Edited", &[]), true);
    let quiet = h.add_doc("Summary", &summary_xml("Quiet", &[]));
    h.add_version(quiet, &summary_xml("Quiet", &[]), true);

    let mut doc = store.get_doc(edited, VersionSelector::Current).unwrap();
    doc.xml = summary_xml("Edited again", &[]);
    store.save_doc(&doc, &SaveOptions::default()).unwrap();

    let changes = store.unpublished_changes(Some("Summary")).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].doc_id, cdr::canonical(edited));
    assert_eq!(changes[0].last_publishable, Some(2));
}
