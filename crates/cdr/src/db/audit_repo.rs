//! Audit trail repository.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::ids::DocId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub doc_id: DocId,
    pub action: String,
    pub user: String,
    pub dt: String,
    pub comment: Option<String>,
}

impl AuditRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            doc_id: row.get("doc_id")?,
            action: row.get("action")?,
            user: row.get("usr")?,
            dt: row.get("dt")?,
            comment: row.get("comment")?,
        })
    }
}

pub fn insert(conn: &Connection, row: &AuditRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_trail (doc_id, action, usr, dt, comment) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.doc_id, row.action, row.user, row.dt, row.comment],
    )?;
    Ok(())
}

/// Audit rows for a document, oldest first.
pub fn for_doc(conn: &Connection, doc_id: DocId) -> Result<Vec<AuditRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, action, usr, dt, comment FROM audit_trail WHERE doc_id = ?1 ORDER BY dt, id",
    )?;
    let rows = stmt
        .query_map(params![doc_id], AuditRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
