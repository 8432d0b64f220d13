//! Link index repository: the `query_term` path/value table.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::DatabaseError;
use crate::ids::DocId;
use crate::wildcard::Wildcard;

/// Width of one `node_loc` segment.
pub const NODE_LOC_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub doc_id: DocId,
    pub path: String,
    pub value: String,
    pub int_val: Option<DocId>,
    pub node_loc: String,
}

impl IndexRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            doc_id: row.get("doc_id")?,
            path: row.get("path")?,
            value: row.get("value")?,
            int_val: row.get("int_val")?,
            node_loc: row.get("node_loc")?,
        })
    }
}

/// Replaces every index row of a document.
pub fn replace_for_doc(
    conn: &Connection,
    doc_id: DocId,
    rows: &[IndexRow],
) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM query_term WHERE doc_id = ?1", params![doc_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO query_term (doc_id, path, value, int_val, node_loc)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for row in rows {
        stmt.execute(params![doc_id, row.path, row.value, row.int_val, row.node_loc])?;
    }
    Ok(())
}

pub fn rows_for_doc(conn: &Connection, doc_id: DocId) -> Result<Vec<IndexRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM query_term WHERE doc_id = ?1 ORDER BY node_loc, path",
    )?;
    let rows = stmt
        .query_map(params![doc_id], IndexRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// How one column of a term is matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextMatch {
    Equals(String),
    Like(Wildcard),
}

/// One constraint on a single `query_term` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTerm {
    pub path: Option<TextMatch>,
    pub value: Option<TextMatch>,
    pub int_val: Option<DocId>,
}

impl IndexTerm {
    pub fn path(path: &str) -> Self {
        Self {
            path: Some(TextMatch::Equals(path.to_string())),
            ..Default::default()
        }
    }

    pub fn path_like(pattern: Wildcard) -> Self {
        Self {
            path: Some(TextMatch::Like(pattern)),
            ..Default::default()
        }
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(TextMatch::Equals(value.to_string()));
        self
    }

    pub fn value_like(mut self, pattern: Wildcard) -> Self {
        self.value = Some(TextMatch::Like(pattern));
        self
    }

    pub fn references(mut self, target: DocId) -> Self {
        self.int_val = Some(target);
        self
    }
}

/// Two terms whose rows must share the first `depth` `node_loc` segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colocation {
    pub left: usize,
    pub right: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub terms: Vec<IndexTerm>,
    pub colocated: Vec<Colocation>,
    pub doc_type: Option<String>,
    pub limit: Option<u32>,
}

struct SqlParts {
    from: String,
    conditions: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

fn push_match(parts: &mut SqlParts, column: &str, m: &TextMatch) {
    match m {
        TextMatch::Equals(v) => {
            parts
                .conditions
                .push(format!("{} = ?{}", column, parts.params.len() + 1));
            parts.params.push(Box::new(v.clone()));
        }
        TextMatch::Like(w) => {
            parts.conditions.push(format!(
                "{} LIKE ?{} ESCAPE '\\'",
                column,
                parts.params.len() + 1
            ));
            parts.params.push(Box::new(w.to_like()));
        }
    }
}

impl IndexQuery {
    pub fn new(terms: Vec<IndexTerm>) -> Self {
        Self {
            terms,
            ..Default::default()
        }
    }

    /// Requires terms `left` and `right` to match under a common element
    /// `depth` levels below the root.
    pub fn colocate(mut self, left: usize, right: usize, depth: usize) -> Self {
        self.colocated.push(Colocation { left, right, depth });
        self
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_type = Some(doc_type.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Describes the first structural problem, if any.
    pub fn check(&self) -> Result<(), String> {
        if self.terms.is_empty() {
            return Err("an index query needs at least one term".to_string());
        }
        for (i, term) in self.terms.iter().enumerate() {
            if term.path.is_none() && term.value.is_none() && term.int_val.is_none() {
                return Err(format!("term {} has no constraint", i));
            }
        }
        for c in &self.colocated {
            if c.left >= self.terms.len() || c.right >= self.terms.len() || c.depth == 0 {
                return Err(format!(
                    "invalid co-location between terms {} and {} at depth {}",
                    c.left, c.right, c.depth
                ));
            }
        }
        Ok(())
    }
}

/// Builds the join. The query must have passed [`IndexQuery::check`].
fn build(query: &IndexQuery) -> SqlParts {
    let mut parts = SqlParts {
        from: "query_term q0".to_string(),
        conditions: Vec::new(),
        params: Vec::new(),
    };
    for i in 1..query.terms.len() {
        parts
            .from
            .push_str(&format!(" JOIN query_term q{i} ON q{i}.doc_id = q0.doc_id"));
    }
    if let Some(ref doc_type) = query.doc_type {
        parts.from.push_str(" JOIN document d ON d.id = q0.doc_id");
        parts
            .conditions
            .push(format!("d.doc_type = ?{}", parts.params.len() + 1));
        parts.params.push(Box::new(doc_type.clone()));
    }
    for (i, term) in query.terms.iter().enumerate() {
        if let Some(ref m) = term.path {
            push_match(&mut parts, &format!("q{}.path", i), m);
        }
        if let Some(ref m) = term.value {
            push_match(&mut parts, &format!("q{}.value", i), m);
        }
        if let Some(target) = term.int_val {
            parts
                .conditions
                .push(format!("q{}.int_val = ?{}", i, parts.params.len() + 1));
            parts.params.push(Box::new(target));
        }
    }
    for c in &query.colocated {
        let len = c.depth * NODE_LOC_WIDTH;
        parts.conditions.push(format!(
            "length(q{l}.node_loc) >= {len} AND substr(q{l}.node_loc, 1, {len}) = substr(q{r}.node_loc, 1, {len})",
            l = c.left,
            r = c.right,
            len = len
        ));
    }
    parts
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// Distinct ids of documents satisfying every term, ascending.
pub fn search(conn: &Connection, query: &IndexQuery) -> Result<Vec<DocId>, DatabaseError> {
    let mut parts = build(query);
    let mut sql = format!(
        "SELECT DISTINCT q0.doc_id FROM {} {} ORDER BY q0.doc_id",
        parts.from,
        where_clause(&parts.conditions)
    );
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT ?{}", parts.params.len() + 1));
        parts.params.push(Box::new(limit));
    }
    run(conn, &sql, &parts.params, |r| r.get(0))
}

/// The rows matched by the first term in documents satisfying every term.
pub fn search_rows(conn: &Connection, query: &IndexQuery) -> Result<Vec<IndexRow>, DatabaseError> {
    let mut parts = build(query);
    let mut sql = format!(
        "SELECT DISTINCT q0.doc_id, q0.path, q0.value, q0.int_val, q0.node_loc FROM {} {}
         ORDER BY q0.doc_id, q0.node_loc",
        parts.from,
        where_clause(&parts.conditions)
    );
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT ?{}", parts.params.len() + 1));
        parts.params.push(Box::new(limit));
    }
    run(conn, &sql, &parts.params, IndexRow::from_row)
}

fn run<T>(
    conn: &Connection,
    sql: &str,
    params: &[Box<dyn ToSql>],
    map: impl FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Documents holding at least one link to `target`.
pub fn linking_docs(conn: &Connection, target: DocId) -> Result<Vec<DocId>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT doc_id FROM query_term WHERE int_val = ?1 AND doc_id <> ?1 ORDER BY doc_id",
    )?;
    let rows = stmt
        .query_map(params![target], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
