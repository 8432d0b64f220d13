//! Version repository: immutable rows of `doc_version`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::ids::DocId;

#[derive(Debug, Clone)]
pub struct VersionRow {
    pub id: DocId,
    pub num: u32,
    pub title: String,
    pub xml: String,
    pub comment: Option<String>,
    pub val_status: String,
    pub publishable: String,
    pub created_at: String,
    pub created_by: String,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            num: row.get("num")?,
            title: row.get("title")?,
            xml: row.get("xml")?,
            comment: row.get("comment")?,
            val_status: row.get("val_status")?,
            publishable: row.get("publishable")?,
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
        })
    }
}

/// Version metadata without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMetaRow {
    pub num: u32,
    pub comment: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub val_status: String,
    pub publishable: String,
}

impl VersionMetaRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            num: row.get("num")?,
            comment: row.get("comment")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            val_status: row.get("val_status")?,
            publishable: row.get("publishable")?,
        })
    }
}

pub fn insert(conn: &Connection, version: &VersionRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doc_version (id, num, title, xml, comment, val_status, publishable,
         created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            version.id,
            version.num,
            version.title,
            version.xml,
            version.comment,
            version.val_status,
            version.publishable,
            version.created_at,
            version.created_by,
        ],
    )?;
    Ok(())
}

/// Highest version number, or `None` for an unversioned document.
pub fn max_num(conn: &Connection, id: DocId) -> Result<Option<u32>, DatabaseError> {
    let num = conn.query_row(
        "SELECT MAX(num) FROM doc_version WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(num)
}

/// Highest version number flagged publishable.
pub fn max_publishable_num(conn: &Connection, id: DocId) -> Result<Option<u32>, DatabaseError> {
    let num = conn.query_row(
        "SELECT MAX(num) FROM doc_version WHERE id = ?1 AND publishable = 'Y' AND val_status = 'V'",
        params![id],
        |r| r.get(0),
    )?;
    Ok(num)
}

pub fn find(conn: &Connection, id: DocId, num: u32) -> Result<Option<VersionRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM doc_version WHERE id = ?1 AND num = ?2",
            params![id, num],
            VersionRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn latest(conn: &Connection, id: DocId) -> Result<Option<VersionRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM doc_version WHERE id = ?1 ORDER BY num DESC LIMIT 1",
            params![id],
            VersionRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// One page of version metadata in descending `num` order, strictly below
/// `below` when given.
pub fn page(
    conn: &Connection,
    id: DocId,
    below: Option<u32>,
    limit: u32,
) -> Result<Vec<VersionMetaRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT num, comment, created_by, created_at, val_status, publishable
         FROM doc_version
         WHERE id = ?1 AND (?2 IS NULL OR num < ?2)
         ORDER BY num DESC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![id, below, limit], VersionMetaRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Documents whose working body was modified after their last publishable
/// version was created (or that have no publishable version at all).
pub fn changed_since_publishable(
    conn: &Connection,
    doc_type: Option<&str>,
) -> Result<Vec<(DocId, String, Option<u32>, Option<String>)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.title, p.num, d.modified_at
         FROM document d
         LEFT JOIN (
             SELECT id, MAX(num) AS num, MAX(created_at) AS created_at
             FROM doc_version
             WHERE publishable = 'Y' AND val_status = 'V'
             GROUP BY id
         ) p ON p.id = d.id
         WHERE d.active_status = 'A'
           AND (?1 IS NULL OR d.doc_type = ?1)
           AND d.modified_at IS NOT NULL
           AND (p.created_at IS NULL OR d.modified_at > p.created_at)
         ORDER BY d.id",
    )?;
    let rows = stmt
        .query_map(params![doc_type], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
