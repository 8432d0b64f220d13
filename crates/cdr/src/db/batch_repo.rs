//! Batch job repository: `batch_job` and `batch_job_transition`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw batch job row. `args` and `notify` hold JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJobRow {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub args: String,
    pub notify: String,
    pub status: String,
    pub progress: Option<String>,
    pub attempts: u32,
    pub requested_by: String,
    pub queued_at: String,
    pub started: Option<String>,
    pub completed: Option<String>,
    pub last_heartbeat: Option<String>,
}

impl BatchJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            command: row.get("command")?,
            args: row.get("args")?,
            notify: row.get("notify")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            attempts: row.get("attempts")?,
            requested_by: row.get("requested_by")?,
            queued_at: row.get("queued_at")?,
            started: row.get("started")?,
            completed: row.get("completed")?,
            last_heartbeat: row.get("last_heartbeat")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRow {
    pub job_id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub dt: String,
    pub message: Option<String>,
}

/// Filters for the status history view.
#[derive(Debug, Default, Clone)]
pub struct BatchJobFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub queued_since: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

pub fn insert(
    conn: &Connection,
    name: &str,
    command: &str,
    args: &str,
    notify: &str,
    requested_by: &str,
    queued_at: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO batch_job (name, command, args, notify, status, requested_by, queued_at)
         VALUES (?1, ?2, ?3, ?4, 'Queued', ?5, ?6)",
        params![name, command, args, notify, requested_by, queued_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<BatchJobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM batch_job WHERE id = ?1",
            params![id],
            BatchJobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// The Queued or Running job of a class, if any.
pub fn active_for_name(conn: &Connection, name: &str) -> Result<Option<BatchJobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM batch_job WHERE name = ?1 AND status IN ('Queued', 'Running')",
            params![name],
            BatchJobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_active(conn: &Connection, name: Option<&str>) -> Result<Vec<BatchJobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM batch_job
         WHERE status IN ('Queued', 'Running') AND (?1 IS NULL OR name = ?1)
         ORDER BY queued_at, id",
    )?;
    let rows = stmt
        .query_map(params![name], BatchJobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Jobs matching every given filter, newest first.
pub fn query(conn: &Connection, filter: &BatchJobFilter) -> Result<Vec<BatchJobRow>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(id) = filter.id {
        conditions.push(format!("id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(id));
    }
    if let Some(ref name) = filter.name {
        conditions.push(format!("name = ?{}", param_values.len() + 1));
        param_values.push(Box::new(name.clone()));
    }
    if let Some(ref since) = filter.queued_since {
        conditions.push(format!("queued_at >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(since.clone()));
    }
    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    param_values.push(Box::new(i64::from(filter.limit.unwrap_or(500))));
    let sql = format!(
        "SELECT * FROM batch_job {} ORDER BY queued_at DESC, id DESC LIMIT ?{}",
        where_clause,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), BatchJobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves a Queued job to Running. Returns false if it was no longer Queued.
pub fn mark_running(conn: &Connection, id: i64, now: &str) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "UPDATE batch_job
         SET status = 'Running', attempts = attempts + 1, started = ?2, last_heartbeat = ?2
         WHERE id = ?1 AND status = 'Queued'",
        params![id, now],
    )?;
    Ok(n == 1)
}

/// Records progress from a Running job. Returns false if the job is not Running.
pub fn heartbeat(
    conn: &Connection,
    id: i64,
    progress: Option<&str>,
    now: &str,
) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "UPDATE batch_job SET last_heartbeat = ?3, progress = COALESCE(?2, progress)
         WHERE id = ?1 AND status = 'Running'",
        params![id, progress, now],
    )?;
    Ok(n == 1)
}

/// Counts one more attempt on a Running job.
pub fn bump_attempts(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE batch_job SET attempts = attempts + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Moves an active job to a terminal status. Returns false if it was
/// already terminal.
pub fn finish(
    conn: &Connection,
    id: i64,
    status: &str,
    progress: Option<&str>,
    now: &str,
) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "UPDATE batch_job SET status = ?2, completed = ?4, progress = COALESCE(?3, progress)
         WHERE id = ?1 AND status IN ('Queued', 'Running')",
        params![id, status, progress, now],
    )?;
    Ok(n == 1)
}

/// Oldest Queued job whose command is one of `commands`.
pub fn oldest_queued(
    conn: &Connection,
    commands: &[&str],
) -> Result<Option<BatchJobRow>, DatabaseError> {
    if commands.is_empty() {
        return Ok(None);
    }
    let placeholders = (1..=commands.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT * FROM batch_job WHERE status = 'Queued' AND command IN ({})
         ORDER BY queued_at, id LIMIT 1",
        placeholders
    );
    let row = conn
        .query_row(
            &sql,
            rusqlite::params_from_iter(commands.iter()),
            BatchJobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Running jobs whose last heartbeat is older than `cutoff`.
pub fn stale_running(conn: &Connection, cutoff: &str) -> Result<Vec<BatchJobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM batch_job
         WHERE status = 'Running' AND COALESCE(last_heartbeat, started, queued_at) < ?1
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![cutoff], BatchJobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_transition(
    conn: &Connection,
    job_id: i64,
    from: Option<&str>,
    to: &str,
    dt: &str,
    message: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO batch_job_transition (job_id, from_status, to_status, dt, message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![job_id, from, to, dt, message],
    )?;
    Ok(())
}

pub fn transitions(conn: &Connection, job_id: i64) -> Result<Vec<TransitionRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT job_id, from_status, to_status, dt, message
         FROM batch_job_transition WHERE job_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![job_id], |r| {
            Ok(TransitionRow {
                job_id: r.get(0)?,
                from_status: r.get(1)?,
                to_status: r.get(2)?,
                dt: r.get(3)?,
                message: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
