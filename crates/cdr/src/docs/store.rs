use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;

use super::link_index;
use super::title;
use super::validate::{SchemaValidator, WellFormedValidator};
use super::{
    ActiveStatus, CreateVersion, DocSummary, Document, NewDocument, SaveOptions, SaveOutcome,
    ValStatus, VersionInfo, FILTER_DOC_TYPE, NO_TITLE,
};
use crate::db::audit_repo::{self, AuditRow};
use crate::db::doc_repo::{self, DocumentRow};
use crate::db::link_repo::{self, IndexRow};
use crate::db::version_repo::{self, VersionMetaRow, VersionRow};
use crate::db::Database;
use crate::error::{CdrError, Result};
use crate::ids::{canonical, DocId, VersionSelector};
use crate::session::{Action, Session};
use crate::time;
use crate::wildcard::Wildcard;

const VERSION_PAGE_SIZE: u32 = 50;

/// Read and write access to documents on behalf of one session.
#[derive(Clone)]
pub struct DocumentStore {
    db: Database,
    session: Session,
    validator: Arc<dyn SchemaValidator>,
}

fn document_not_found(id: DocId) -> CdrError {
    CdrError::not_found("Document", canonical(id))
}

fn load_row(conn: &Connection, id: DocId) -> Result<DocumentRow> {
    doc_repo::find_by_id(conn, id)?.ok_or_else(|| document_not_found(id))
}

fn from_cwd(row: DocumentRow) -> Result<Document> {
    Ok(Document {
        id: row.id,
        active_status: ActiveStatus::from_code(&row.active_status)?,
        val_status: ValStatus::from_code(&row.val_status)?,
        doc_type: row.doc_type,
        title: row.title,
        xml: row.xml,
        version: None,
        publishable: None,
        comment: None,
        created_at: row.created_at,
        created_by: row.created_by,
        modified_at: row.modified_at,
        modified_by: row.modified_by,
        checked_out_by: row.checked_out_by,
    })
}

fn from_version(row: DocumentRow, v: VersionRow) -> Result<Document> {
    Ok(Document {
        id: row.id,
        doc_type: row.doc_type,
        title: v.title,
        xml: v.xml,
        active_status: ActiveStatus::from_code(&row.active_status)?,
        val_status: ValStatus::from_code(&v.val_status)?,
        version: Some(v.num),
        publishable: Some(v.publishable == "Y"),
        comment: v.comment,
        created_at: v.created_at,
        created_by: v.created_by,
        modified_at: None,
        modified_by: None,
        checked_out_by: row.checked_out_by,
    })
}

fn version_info(row: VersionMetaRow) -> Result<VersionInfo> {
    Ok(VersionInfo {
        num: row.num,
        val_status: ValStatus::from_code(&row.val_status)?,
        publishable: row.publishable == "Y",
        comment: row.comment,
        user: row.created_by,
        created_at: row.created_at,
    })
}

pub(crate) fn summary(row: doc_repo::DocSummaryRow) -> Result<DocSummary> {
    Ok(DocSummary {
        id: row.id,
        active_status: ActiveStatus::from_code(&row.active_status)?,
        doc_type: row.doc_type,
        title: row.title,
    })
}

/// Link index rows for a body. A body that does not parse indexes nothing.
fn index_rows(doc_id: DocId, xml: &str) -> Vec<IndexRow> {
    match link_index::extract(doc_id, xml) {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("Not indexing {}: {}", canonical(doc_id), e);
            Vec::new()
        }
    }
}

/// Reads a document at the requested version.
pub(crate) fn read_doc(conn: &Connection, id: DocId, selector: VersionSelector) -> Result<Document> {
    let row = load_row(conn, id)?;
    let num = match selector {
        VersionSelector::Current => return from_cwd(row),
        VersionSelector::Last => {
            version_repo::max_num(conn, id)?.ok_or_else(|| CdrError::NoVersions(canonical(id)))?
        }
        VersionSelector::LastPublishable => version_repo::max_publishable_num(conn, id)?
            .ok_or_else(|| CdrError::NoPublishableVersion(canonical(id)))?,
        VersionSelector::Number(n) => {
            if version_repo::max_num(conn, id)?.is_none() {
                return Err(CdrError::NoVersions(canonical(id)));
            }
            n
        }
    };
    let version = version_repo::find(conn, id, num)?
        .ok_or_else(|| CdrError::not_found("Version", format!("{}/{}", canonical(id), num)))?;
    from_version(row, version)
}

impl DocumentStore {
    pub fn new(db: Database, session: Session) -> Self {
        Self {
            db,
            session,
            validator: Arc::new(WellFormedValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn validator(&self) -> &Arc<dyn SchemaValidator> {
        &self.validator
    }

    /// Reads a document body and metadata.
    ///
    /// Fails with `NotFound` for an unknown id or version number,
    /// `NoVersions` when a version is requested from an unversioned
    /// document, and `NoPublishableVersion` for `lastp` without one.
    pub fn get_doc(&self, id: DocId, selector: VersionSelector) -> Result<Document> {
        self.db.read(|conn| read_doc(conn, id, selector))
    }

    pub fn exists(&self, id: DocId) -> Result<bool> {
        Ok(self.db.with_conn(|conn| doc_repo::exists(conn, id))?)
    }

    /// Creates a document and its first version.
    pub fn create_doc(&self, new: NewDocument) -> Result<SaveOutcome> {
        self.session.require(Action::AddDocument)?;
        let doc_type = new.doc_type.trim().to_string();
        if doc_type.is_empty() {
            return Err(CdrError::InvalidInput("document type is required".to_string()));
        }
        let title = new
            .title
            .as_deref()
            .map(title::normalize)
            .filter(|t| !t.is_empty())
            .or_else(|| title::derive(&doc_type, &new.xml))
            .unwrap_or_else(|| NO_TITLE.to_string());
        let user = self.session.user.clone();

        let doc_id = self.db.with_tx(|tx| {
            if doc_type == FILTER_DOC_TYPE {
                ensure_filter_name_free(tx, &title, None)?;
            }
            let now = time::now();
            let id = doc_repo::insert(tx, &doc_type, &title, &new.xml, &now, &user)?;
            version_repo::insert(
                tx,
                &VersionRow {
                    id,
                    num: 1,
                    title: title.clone(),
                    xml: new.xml.clone(),
                    comment: Some("Initial version".to_string()),
                    val_status: ValStatus::Unvalidated.code().to_string(),
                    publishable: "N".to_string(),
                    created_at: now.clone(),
                    created_by: user.clone(),
                },
            )?;
            link_repo::replace_for_doc(tx, id, &index_rows(id, &new.xml))?;
            audit_repo::insert(
                tx,
                &AuditRow {
                    doc_id: id,
                    action: Action::AddDocument.as_str().to_string(),
                    user: user.clone(),
                    dt: now,
                    comment: None,
                },
            )?;
            Ok(id)
        })?;

        log::info!("Created {} ({})", canonical(doc_id), doc_type);
        Ok(SaveOutcome {
            doc_id,
            version: Some(1),
            warnings: Vec::new(),
        })
    }

    /// Writes the current working body and optionally appends a version.
    ///
    /// The whole save runs in one IMMEDIATE transaction, so version numbers
    /// and timestamps are assigned without interleaving. Validation errors
    /// abort the save before anything is written.
    pub fn save_doc(&self, doc: &Document, opts: &SaveOptions) -> Result<SaveOutcome> {
        self.session.require(Action::ModifyDocument)?;
        if opts.publishable && opts.create_version == CreateVersion::Never {
            return Err(CdrError::InvalidInput(
                "a publishable save must create a version".to_string(),
            ));
        }
        let user = self.session.user.clone();

        let outcome = self.db.with_tx(|tx| {
            let row = load_row(tx, doc.id)?;
            if let Some(holder) = row.checked_out_by.as_deref() {
                if holder != user {
                    return Err(CdrError::InvariantViolation(format!(
                        "{} is checked out by {}",
                        canonical(doc.id),
                        holder
                    )));
                }
            }

            let mut warnings = Vec::new();
            let val_status = if opts.validate || opts.publishable {
                let messages = self.validator.validate(&row.doc_type, &doc.xml);
                if messages.iter().any(|m| m.is_error()) {
                    return Err(CdrError::ValidationErrors(messages));
                }
                warnings = messages;
                ValStatus::Valid
            } else {
                ValStatus::Unvalidated
            };

            let title = title::derive(&row.doc_type, &doc.xml)
                .or_else(|| Some(title::normalize(&doc.title)).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| row.title.clone());
            if row.doc_type == FILTER_DOC_TYPE && !title.eq_ignore_ascii_case(&row.title) {
                ensure_filter_name_free(tx, &title, Some(doc.id))?;
            }

            let latest = version_repo::latest(tx, doc.id)?;
            let make_version = match opts.create_version {
                CreateVersion::Never => false,
                CreateVersion::Always => true,
                CreateVersion::OnChange => latest.as_ref().map_or(true, |v| {
                    v.xml != doc.xml || (opts.publishable && v.publishable != "Y")
                }),
            };
            let stamp = time::strictly_after(
                latest.as_ref().map(|v| v.created_at.as_str()),
                Utc::now(),
            );

            let version = if make_version {
                let num = latest.as_ref().map_or(1, |v| v.num + 1);
                version_repo::insert(
                    tx,
                    &VersionRow {
                        id: doc.id,
                        num,
                        title: title.clone(),
                        xml: doc.xml.clone(),
                        comment: opts.comment.clone(),
                        val_status: val_status.code().to_string(),
                        publishable: if opts.publishable { "Y" } else { "N" }.to_string(),
                        created_at: stamp.clone(),
                        created_by: user.clone(),
                    },
                )?;
                Some(num)
            } else {
                None
            };

            let checked_out_by = if opts.check_in {
                None
            } else {
                Some(user.as_str())
            };
            doc_repo::update_body(
                tx,
                doc.id,
                &title,
                &doc.xml,
                val_status.code(),
                checked_out_by,
                &stamp,
                &user,
            )?;
            link_repo::replace_for_doc(tx, doc.id, &index_rows(doc.id, &doc.xml))?;
            audit_repo::insert(
                tx,
                &AuditRow {
                    doc_id: doc.id,
                    action: Action::ModifyDocument.as_str().to_string(),
                    user: user.clone(),
                    dt: stamp,
                    comment: opts.comment.clone(),
                },
            )?;

            Ok(SaveOutcome {
                doc_id: doc.id,
                version,
                warnings,
            })
        })?;

        match outcome.version {
            Some(v) => log::info!("Saved {} as version {}", canonical(doc.id), v),
            None => log::debug!("Saved working body of {}", canonical(doc.id)),
        }
        Ok(outcome)
    }

    /// Promotes an earlier version's body to the current working document.
    pub fn replace_cwd_with_version(
        &self,
        id: DocId,
        version: u32,
        create_version: CreateVersion,
        publishable: bool,
        comment: Option<&str>,
    ) -> Result<SaveOutcome> {
        let old = self.get_doc(id, VersionSelector::Number(version))?;
        let opts = SaveOptions {
            create_version,
            publishable,
            check_in: true,
            validate: publishable,
            comment: Some(
                comment
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Replaced working document with version {}", version)),
            ),
        };
        self.save_doc(&old, &opts)
    }

    pub fn check_out(&self, id: DocId) -> Result<()> {
        self.session.require(Action::ModifyDocument)?;
        let user = self.session.user.clone();
        self.db.with_tx(|tx| {
            let row = load_row(tx, id)?;
            match row.checked_out_by.as_deref() {
                Some(holder) if holder != user => Err(CdrError::InvariantViolation(format!(
                    "{} is checked out by {}",
                    canonical(id),
                    holder
                ))),
                _ => Ok(doc_repo::set_checked_out(tx, id, Some(user.as_str()))?),
            }
        })
    }

    pub fn check_in(&self, id: DocId) -> Result<()> {
        self.session.require(Action::ModifyDocument)?;
        let user = self.session.user.clone();
        self.db.with_tx(|tx| {
            let row = load_row(tx, id)?;
            match row.checked_out_by.as_deref() {
                Some(holder) if holder != user => Err(CdrError::InvariantViolation(format!(
                    "{} is checked out by {}",
                    canonical(id),
                    holder
                ))),
                _ => Ok(doc_repo::set_checked_out(tx, id, None)?),
            }
        })
    }

    /// Blocks (`Inactive`) or unblocks (`Active`) a document.
    pub fn set_active_status(
        &self,
        id: DocId,
        status: ActiveStatus,
        comment: Option<&str>,
    ) -> Result<()> {
        self.session.require(Action::ModifyDocument)?;
        let user = self.session.user.clone();
        self.db.with_tx(|tx| {
            load_row(tx, id)?;
            let now = time::now();
            doc_repo::set_active_status(tx, id, status.code(), &now, &user)?;
            let action = match status {
                ActiveStatus::Active => "UNBLOCK DOCUMENT",
                ActiveStatus::Inactive => "BLOCK DOCUMENT",
            };
            audit_repo::insert(
                tx,
                &AuditRow {
                    doc_id: id,
                    action: action.to_string(),
                    user: user.clone(),
                    dt: now,
                    comment: comment.map(str::to_string),
                },
            )?;
            Ok(())
        })?;
        log::info!("{} is now {}", canonical(id), status);
        Ok(())
    }

    /// Version metadata in descending `num` order, read lazily in pages.
    pub fn list_versions(&self, id: DocId) -> Result<VersionIter> {
        if !self.exists(id)? {
            return Err(document_not_found(id));
        }
        Ok(VersionIter::new(self.db.clone(), id, VERSION_PAGE_SIZE))
    }

    /// Documents whose title matches a wildcard pattern, for pickers.
    pub fn find_by_title(
        &self,
        pattern: &Wildcard,
        doc_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<DocSummary>> {
        let rows = self
            .db
            .with_conn(|conn| doc_repo::find_by_title(conn, &pattern.to_like(), doc_type, limit))?;
        rows.into_iter().map(summary).collect()
    }

    pub fn audit_trail(&self, id: DocId) -> Result<Vec<AuditRow>> {
        Ok(self.db.with_conn(|conn| audit_repo::for_doc(conn, id))?)
    }
}

fn ensure_filter_name_free(conn: &Connection, name: &str, this: Option<DocId>) -> Result<()> {
    match doc_repo::find_filter_by_name(conn, name)? {
        Some(existing) if Some(existing) != this => Err(CdrError::InvariantViolation(format!(
            "a filter named '{}' already exists ({})",
            name,
            canonical(existing)
        ))),
        _ => Ok(()),
    }
}

/// Lazy, finite, non-restartable sequence of version metadata.
///
/// Each page is fetched on demand; a failed fetch yields the error once and
/// ends the sequence.
pub struct VersionIter {
    db: Database,
    doc_id: DocId,
    page_size: u32,
    below: Option<u32>,
    buffer: VecDeque<VersionMetaRow>,
    done: bool,
}

impl VersionIter {
    fn new(db: Database, doc_id: DocId, page_size: u32) -> Self {
        Self {
            db,
            doc_id,
            page_size: page_size.max(1),
            below: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let page = self
            .db
            .with_conn(|conn| version_repo::page(conn, self.doc_id, self.below, self.page_size))?;
        if (page.len() as u32) < self.page_size {
            self.done = true;
        }
        if let Some(last) = page.last() {
            self.below = Some(last.num);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for VersionIter {
    type Item = Result<VersionInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(version_info)
    }
}
