//! Suppression patterns and the external label pool (`external_map`).

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::ids::DocId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRow {
    pub id: i64,
    pub pattern: String,
}

/// An externally supplied label and its mapping state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalValueRow {
    pub id: i64,
    pub usage: String,
    pub value: String,
    pub doc_id: Option<DocId>,
    pub mappable: bool,
}

pub fn list(conn: &Connection) -> Result<Vec<PatternRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, pattern FROM external_map_nomap_pattern ORDER BY pattern")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(PatternRow {
                id: r.get(0)?,
                pattern: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find(conn: &Connection, id: i64) -> Result<Option<PatternRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, pattern FROM external_map_nomap_pattern WHERE id = ?1",
            params![id],
            |r| {
                Ok(PatternRow {
                    id: r.get(0)?,
                    pattern: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Inserts a pattern. Duplicates fail with a unique-constraint error.
pub fn insert(conn: &Connection, pattern: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO external_map_nomap_pattern (pattern) VALUES (?1)",
        params![pattern],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(conn: &Connection, id: i64, pattern: &str) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "UPDATE external_map_nomap_pattern SET pattern = ?2 WHERE id = ?1",
        params![id, pattern],
    )?;
    Ok(n == 1)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM external_map_nomap_pattern WHERE id = ?1",
        params![id],
    )?;
    Ok(n == 1)
}

/// Marks unmapped, still-mappable labels matching a `LIKE` pattern as
/// never-mappable. Returns the number of labels changed.
pub fn apply(conn: &Connection, like: &str, now: &str) -> Result<usize, DatabaseError> {
    let n = conn.execute(
        "UPDATE external_map SET mappable = 'N', last_mod = ?2
         WHERE doc_id IS NULL AND mappable = 'Y' AND value LIKE ?1 ESCAPE '\\'",
        params![like, now],
    )?;
    Ok(n)
}

pub fn insert_value(
    conn: &Connection,
    usage: &str,
    value: &str,
    doc_id: Option<DocId>,
    now: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO external_map (usage, value, doc_id, last_mod) VALUES (?1, ?2, ?3, ?4)",
        params![usage, value, doc_id, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Labels not mapped to a document, optionally restricted to one usage.
pub fn list_unmapped(
    conn: &Connection,
    usage: Option<&str>,
) -> Result<Vec<ExternalValueRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, usage, value, doc_id, mappable FROM external_map
         WHERE doc_id IS NULL AND (?1 IS NULL OR usage = ?1)
         ORDER BY usage, value",
    )?;
    let rows = stmt
        .query_map(params![usage], |r| {
            Ok(ExternalValueRow {
                id: r.get(0)?,
                usage: r.get(1)?,
                value: r.get(2)?,
                doc_id: r.get(3)?,
                mappable: r.get::<_, String>(4)? == "Y",
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
