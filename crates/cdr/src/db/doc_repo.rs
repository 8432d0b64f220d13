//! Document repository: the `document` table (current working bodies).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::ids::DocId;

/// A raw document row.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: DocId,
    pub doc_type: String,
    pub title: String,
    pub xml: String,
    pub active_status: String,
    pub val_status: String,
    pub checked_out_by: Option<String>,
    pub created_at: String,
    pub created_by: String,
    pub modified_at: Option<String>,
    pub modified_by: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            doc_type: row.get("doc_type")?,
            title: row.get("title")?,
            xml: row.get("xml")?,
            active_status: row.get("active_status")?,
            val_status: row.get("val_status")?,
            checked_out_by: row.get("checked_out_by")?,
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
            modified_at: row.get("modified_at")?,
            modified_by: row.get("modified_by")?,
        })
    }
}

/// Identity columns only, for pickers and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSummaryRow {
    pub id: DocId,
    pub doc_type: String,
    pub title: String,
    pub active_status: String,
}

impl DocSummaryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            doc_type: row.get("doc_type")?,
            title: row.get("title")?,
            active_status: row.get("active_status")?,
        })
    }
}

/// Inserts a document and returns its new id.
pub fn insert(
    conn: &Connection,
    doc_type: &str,
    title: &str,
    xml: &str,
    created_at: &str,
    created_by: &str,
) -> Result<DocId, DatabaseError> {
    conn.execute(
        "INSERT INTO document (doc_type, title, xml, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![doc_type, title, xml, created_at, created_by],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a document by its id.
pub fn find_by_id(conn: &Connection, id: DocId) -> Result<Option<DocumentRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM document WHERE id = ?1",
            params![id],
            DocumentRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn exists(conn: &Connection, id: DocId) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM document WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Overwrites the current working body and its derived columns.
#[allow(clippy::too_many_arguments)]
pub fn update_body(
    conn: &Connection,
    id: DocId,
    title: &str,
    xml: &str,
    val_status: &str,
    checked_out_by: Option<&str>,
    modified_at: &str,
    modified_by: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE document SET title = ?2, xml = ?3, val_status = ?4, checked_out_by = ?5,
         modified_at = ?6, modified_by = ?7
         WHERE id = ?1",
        params![id, title, xml, val_status, checked_out_by, modified_at, modified_by],
    )?;
    Ok(())
}

pub fn set_checked_out(
    conn: &Connection,
    id: DocId,
    user: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE document SET checked_out_by = ?2 WHERE id = ?1",
        params![id, user],
    )?;
    Ok(())
}

pub fn set_active_status(
    conn: &Connection,
    id: DocId,
    status: &str,
    modified_at: &str,
    modified_by: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE document SET active_status = ?2, modified_at = ?3, modified_by = ?4 WHERE id = ?1",
        params![id, status, modified_at, modified_by],
    )?;
    Ok(())
}

/// Documents whose title matches a `LIKE ... ESCAPE '\'` pattern.
pub fn find_by_title(
    conn: &Connection,
    like: &str,
    doc_type: Option<&str>,
    limit: u32,
) -> Result<Vec<DocSummaryRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doc_type, title, active_status FROM document
         WHERE title LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR doc_type = ?2)
         ORDER BY title COLLATE NOCASE, id
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![like, doc_type, limit], DocSummaryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Id of the filter document with the given name (case-insensitive).
pub fn find_filter_by_name(conn: &Connection, name: &str) -> Result<Option<DocId>, DatabaseError> {
    let id = conn
        .query_row(
            "SELECT id FROM document WHERE doc_type = 'Filter' AND title = ?1 COLLATE NOCASE
             ORDER BY id LIMIT 1",
            params![name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// All documents of one type, ordered by title.
pub fn list_by_type(conn: &Connection, doc_type: &str) -> Result<Vec<DocSummaryRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doc_type, title, active_status FROM document
         WHERE doc_type = ?1 ORDER BY title COLLATE NOCASE, id",
    )?;
    let rows = stmt
        .query_map(params![doc_type], DocSummaryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn summaries(conn: &Connection, ids: &[DocId]) -> Result<Vec<DocSummaryRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, doc_type, title, active_status FROM document WHERE id = ?1")?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = stmt
            .query_row(params![id], DocSummaryRow::from_row)
            .optional()?
        {
            out.push(row);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn seed(conn: &Connection) -> DocId {
        insert(
            conn,
            "Summary",
            "Breast Cancer Treatment",
            "<Summary/>",
            "2024-01-01T00:00:00.000000Z",
            "tester",
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let id = seed(conn);
            let row = find_by_id(conn, id)?.unwrap();
            assert_eq!(row.doc_type, "Summary");
            assert_eq!(row.active_status, "A");
            assert_eq!(row.val_status, "U");
            assert!(row.checked_out_by.is_none());
            assert!(find_by_id(conn, id + 100)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_by_title_respects_escape() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn);
            insert(conn, "Summary", "100% Juice", "<Summary/>", "2024-01-01T00:00:00.000000Z", "t")?;
            insert(conn, "Summary", "1000 Cranes", "<Summary/>", "2024-01-01T00:00:00.000000Z", "t")?;

            let rows = find_by_title(conn, "breast%", None, 10)?;
            assert_eq!(rows.len(), 1);

            let rows = find_by_title(conn, r"100\%%", Some("Summary"), 10)?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].title, "100% Juice");

            assert!(find_by_title(conn, "breast%", Some("Citation"), 10)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_filter_by_name_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let id = insert(
                conn,
                "Filter",
                "Vendor Filter: Summary",
                "<xsl:transform/>",
                "2024-01-01T00:00:00.000000Z",
                "t",
            )?;
            assert_eq!(find_filter_by_name(conn, "vendor filter: summary")?, Some(id));
            assert_eq!(find_filter_by_name(conn, "Other")?, None);
            Ok(())
        })
        .unwrap();
    }
}
