//! Read-only queries over the link index.

pub use crate::db::link_repo::{Colocation, IndexQuery, IndexRow, IndexTerm, TextMatch};

use serde::{Deserialize, Serialize};

use super::store::{summary, DocumentStore};
use super::DocSummary;
use crate::db::{doc_repo, link_repo, version_repo};
use crate::error::{CdrError, Result};
use crate::ids::{canonical, DocId};

/// An active document whose working body changed after its last
/// publishable version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpublishedChange {
    pub doc_id: String,
    pub title: String,
    /// `None` when the document was never made publishable.
    pub last_publishable: Option<u32>,
    pub modified_at: Option<String>,
}

impl DocumentStore {
    /// Sorted, distinct ids of documents satisfying every constraint.
    pub fn query_index(&self, query: &IndexQuery) -> Result<Vec<DocId>> {
        query.check().map_err(CdrError::InvalidInput)?;
        Ok(self.database().with_conn(|conn| link_repo::search(conn, query))?)
    }

    /// Rows matched by the first term, in documents satisfying every term.
    pub fn query_index_rows(&self, query: &IndexQuery) -> Result<Vec<IndexRow>> {
        query.check().map_err(CdrError::InvalidInput)?;
        Ok(self
            .database()
            .with_conn(|conn| link_repo::search_rows(conn, query))?)
    }

    /// Documents that link to `target`.
    pub fn linking_docs(&self, target: DocId) -> Result<Vec<DocId>> {
        Ok(self
            .database()
            .with_conn(|conn| link_repo::linking_docs(conn, target))?)
    }

    pub fn index_rows(&self, doc_id: DocId) -> Result<Vec<IndexRow>> {
        Ok(self
            .database()
            .with_conn(|conn| link_repo::rows_for_doc(conn, doc_id))?)
    }

    /// Every document of one type, ordered by title.
    pub fn list_by_type(&self, doc_type: &str) -> Result<Vec<DocSummary>> {
        let rows = self
            .database()
            .with_conn(|conn| doc_repo::list_by_type(conn, doc_type))?;
        rows.into_iter().map(summary).collect()
    }

    pub fn unpublished_changes(&self, doc_type: Option<&str>) -> Result<Vec<UnpublishedChange>> {
        let rows = self
            .database()
            .with_conn(|conn| version_repo::changed_since_publishable(conn, doc_type))?;
        Ok(rows
            .into_iter()
            .map(|(id, title, last_publishable, modified_at)| UnpublishedChange {
                doc_id: canonical(id),
                title,
                last_publishable,
                modified_at,
            })
            .collect())
    }

    /// Identity columns of the given documents, skipping unknown ids.
    pub fn summaries(&self, ids: &[DocId]) -> Result<Vec<DocSummary>> {
        let rows = self.database().with_conn(|conn| doc_repo::summaries(conn, ids))?;
        rows.into_iter().map(summary).collect()
    }
}
