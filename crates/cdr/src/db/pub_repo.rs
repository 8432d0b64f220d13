//! Publication ledger repository: `pub_proc`, `pub_proc_doc`, `pub_proc_cg`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::ids::DocId;

/// Subset name of jobs that re-push the whole public set.
pub const FULL_LOAD_SUBSET: &str = "Full-Load";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubJobRow {
    pub id: i64,
    pub pub_subset: String,
    pub status: String,
    pub started: String,
    pub completed: Option<String>,
    pub output_dir: String,
    pub usr: String,
    pub messages: Option<String>,
}

impl PubJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            pub_subset: row.get("pub_subset")?,
            status: row.get("status")?,
            started: row.get("started")?,
            completed: row.get("completed")?,
            output_dir: row.get("output_dir")?,
            usr: row.get("usr")?,
            messages: row.get("messages")?,
        })
    }
}

/// A document event joined with its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubEventRow {
    pub job_id: i64,
    pub doc_id: DocId,
    pub doc_version: u32,
    pub removed: bool,
    pub failure: bool,
    pub started: String,
    pub output_dir: String,
    pub pub_subset: String,
    pub job_status: String,
}

impl PubEventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("pub_proc")?,
            doc_id: row.get("doc_id")?,
            doc_version: row.get("doc_version")?,
            removed: row.get::<_, String>("removed")? == "Y",
            failure: row.get::<_, String>("failure")? == "Y",
            started: row.get("started")?,
            output_dir: row.get("output_dir")?,
            pub_subset: row.get("pub_subset")?,
            job_status: row.get("status")?,
        })
    }
}

const EVENT_COLUMNS: &str = "d.pub_proc, d.doc_id, d.doc_version, d.removed, d.failure,
    p.started, p.output_dir, p.pub_subset, p.status";

pub fn insert_job(
    conn: &Connection,
    pub_subset: &str,
    output_dir: &str,
    usr: &str,
    status: &str,
    started: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pub_proc (pub_subset, status, started, output_dir, usr)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![pub_subset, status, started, output_dir, usr],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_job(conn: &Connection, id: i64) -> Result<Option<PubJobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM pub_proc WHERE id = ?1",
            params![id],
            PubJobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Jobs still Pending or InProgress, oldest first.
pub fn unfinished_jobs(conn: &Connection) -> Result<Vec<PubJobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM pub_proc WHERE status IN ('Pending', 'InProgress') ORDER BY started, id",
    )?;
    let rows = stmt
        .query_map([], PubJobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_job_status(
    conn: &Connection,
    id: i64,
    status: &str,
    completed: Option<&str>,
    message: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE pub_proc SET status = ?2, completed = COALESCE(?3, completed),
         messages = CASE WHEN ?4 IS NULL THEN messages
                         WHEN messages IS NULL THEN ?4
                         ELSE messages || char(10) || ?4 END
         WHERE id = ?1",
        params![id, status, completed, message],
    )?;
    Ok(())
}

pub fn insert_doc_event(
    conn: &Connection,
    job_id: i64,
    doc_id: DocId,
    doc_version: u32,
    removed: bool,
    failure: bool,
    message: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO pub_proc_doc (pub_proc, doc_id, doc_version, removed, failure, messages)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            job_id,
            doc_id,
            doc_version,
            if removed { "Y" } else { "N" },
            if failure { "Y" } else { "N" },
            message
        ],
    )?;
    Ok(())
}

/// All events for a document in chronological order.
pub fn events_for_doc(conn: &Connection, doc_id: DocId) -> Result<Vec<PubEventRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM pub_proc_doc d JOIN pub_proc p ON p.id = d.pub_proc
         WHERE d.doc_id = ?1 ORDER BY p.started, p.id",
        EVENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![doc_id], PubEventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Events for one job, ordered by document id.
pub fn events_for_job(conn: &Connection, job_id: i64) -> Result<Vec<PubEventRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM pub_proc_doc d JOIN pub_proc p ON p.id = d.pub_proc
         WHERE d.pub_proc = ?1 ORDER BY d.doc_id",
        EVENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![job_id], PubEventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Earliest successful Full-Load job started after `job_id` started.
pub fn first_full_load_after(
    conn: &Connection,
    job_id: i64,
) -> Result<Option<PubJobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM pub_proc
             WHERE pub_subset = ?2 AND status = 'Success'
               AND started > (SELECT started FROM pub_proc WHERE id = ?1)
             ORDER BY started, id
             LIMIT 1",
            params![job_id, FULL_LOAD_SUBSET],
            PubJobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// The projection entry for a document: `(job_id, doc_version)`.
pub fn projection_entry(
    conn: &Connection,
    doc_id: DocId,
) -> Result<Option<(i64, u32)>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT pub_proc, doc_version FROM pub_proc_cg WHERE id = ?1",
            params![doc_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_projection(
    conn: &Connection,
    doc_id: DocId,
    job_id: i64,
    doc_version: u32,
    xml: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pub_proc_cg (id, pub_proc, doc_version, xml) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET pub_proc = excluded.pub_proc,
             doc_version = excluded.doc_version, xml = excluded.xml",
        params![doc_id, job_id, doc_version, xml],
    )?;
    Ok(())
}

pub fn remove_projection(conn: &Connection, doc_id: DocId) -> Result<bool, DatabaseError> {
    let n = conn.execute("DELETE FROM pub_proc_cg WHERE id = ?1", params![doc_id])?;
    Ok(n > 0)
}

pub fn projection_ids(conn: &Connection) -> Result<Vec<DocId>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM pub_proc_cg ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
