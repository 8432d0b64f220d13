//! Filter set repository: `filter_set` and its ordered `filter_set_member` rows.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::ids::DocId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSetRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub notes: Option<String>,
}

impl FilterSetRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            notes: row.get("notes")?,
        })
    }
}

/// One member slot: a filter document or a nested set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRow {
    Filter(DocId),
    Subset(i64),
}

fn member_from_row(row: &Row<'_>) -> Result<MemberRow, rusqlite::Error> {
    let filter: Option<DocId> = row.get("filter")?;
    let subset: Option<i64> = row.get("subset")?;
    match (filter, subset) {
        (Some(f), None) => Ok(MemberRow::Filter(f)),
        (None, Some(s)) => Ok(MemberRow::Subset(s)),
        _ => Err(rusqlite::Error::InvalidColumnType(
            0,
            "filter/subset".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<FilterSetRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM filter_set WHERE name = ?1",
            params![name],
            FilterSetRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<FilterSetRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM filter_set WHERE id = ?1",
            params![id],
            FilterSetRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list(conn: &Connection) -> Result<Vec<FilterSetRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM filter_set ORDER BY name")?;
    let rows = stmt
        .query_map([], FilterSetRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Members of one set in position order.
pub fn members(conn: &Connection, set_id: i64) -> Result<Vec<MemberRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT filter, subset FROM filter_set_member WHERE filter_set = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![set_id], member_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every member row of every set, grouped by set and in position order.
pub fn all_members(conn: &Connection) -> Result<Vec<(i64, MemberRow)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT filter_set, filter, subset FROM filter_set_member ORDER BY filter_set, position",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, member_from_row(r)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert(
    conn: &Connection,
    name: &str,
    description: &str,
    notes: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO filter_set (name, description, notes) VALUES (?1, ?2, ?3)",
        params![name, description, notes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    name: &str,
    description: &str,
    notes: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE filter_set SET name = ?2, description = ?3, notes = ?4 WHERE id = ?1",
        params![id, name, description, notes],
    )?;
    Ok(())
}

pub fn replace_members(
    conn: &Connection,
    set_id: i64,
    members: &[MemberRow],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM filter_set_member WHERE filter_set = ?1",
        params![set_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO filter_set_member (filter_set, position, filter, subset)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (i, member) in members.iter().enumerate() {
        let (filter, subset) = match member {
            MemberRow::Filter(f) => (Some(*f), None),
            MemberRow::Subset(s) => (None, Some(*s)),
        };
        stmt.execute(params![set_id, (i + 1) as i64, filter, subset])?;
    }
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM filter_set_member WHERE filter_set = ?1",
        params![id],
    )?;
    conn.execute("DELETE FROM filter_set WHERE id = ?1", params![id])?;
    Ok(())
}

/// Names of the sets that list `set_id` directly as a member.
pub fn direct_parents(conn: &Connection, set_id: i64) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.name FROM filter_set_member m
         JOIN filter_set s ON s.id = m.filter_set
         WHERE m.subset = ?1
         ORDER BY s.name",
    )?;
    let rows = stmt
        .query_map(params![set_id], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
