//! Suppression patterns for externally supplied labels that can never be
//! mapped to a document.

use serde::{Deserialize, Serialize};

use crate::db::nomap_repo::{self, ExternalValueRow, PatternRow};
use crate::db::Database;
use crate::error::{CdrError, Result};
use crate::ids::DocId;
use crate::session::{Action, Session};
use crate::time;
use crate::wildcard::Wildcard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionPattern {
    pub id: i64,
    pub pattern: Wildcard,
}

impl From<PatternRow> for SuppressionPattern {
    fn from(row: PatternRow) -> Self {
        Self {
            id: row.id,
            pattern: Wildcard::new(&row.pattern),
        }
    }
}

/// An unmapped external label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalValue {
    pub id: i64,
    pub usage: String,
    pub value: String,
    pub mappable: bool,
}

impl From<ExternalValueRow> for ExternalValue {
    fn from(row: ExternalValueRow) -> Self {
        Self {
            id: row.id,
            usage: row.usage,
            value: row.value,
            mappable: row.mappable,
        }
    }
}

#[derive(Clone)]
pub struct NomapPatterns {
    db: Database,
    session: Session,
}

fn check_pattern(pattern: &str) -> Result<Wildcard> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(CdrError::InvalidInput("pattern is empty".to_string()));
    }
    if trimmed.chars().all(|c| c == '%') {
        return Err(CdrError::InvalidInput(format!(
            "pattern '{}' would suppress every label",
            trimmed
        )));
    }
    Ok(Wildcard::new(trimmed))
}

fn duplicate(pattern: &Wildcard) -> CdrError {
    CdrError::InvariantViolation(format!("pattern '{}' already exists", pattern))
}

impl NomapPatterns {
    pub fn new(db: Database, session: Session) -> Self {
        Self { db, session }
    }

    pub fn list(&self) -> Result<Vec<SuppressionPattern>> {
        let rows = self.db.read(|conn| Ok(nomap_repo::list(conn)?))?;
        Ok(rows.into_iter().map(SuppressionPattern::from).collect())
    }

    pub fn add(&self, pattern: &str) -> Result<i64> {
        self.session.require(Action::EditNonMappablePatterns)?;
        let pattern = check_pattern(pattern)?;
        let id = self
            .db
            .with_conn(|conn| nomap_repo::insert(conn, pattern.as_str()))
            .map_err(|e| {
                if e.is_unique_violation() {
                    duplicate(&pattern)
                } else {
                    e.into()
                }
            })?;
        log::info!("{} added non-mappable pattern {}", self.session.user, pattern);
        Ok(id)
    }

    pub fn update(&self, id: i64, pattern: &str) -> Result<()> {
        self.session.require(Action::EditNonMappablePatterns)?;
        let pattern = check_pattern(pattern)?;
        let updated = self
            .db
            .with_conn(|conn| nomap_repo::update(conn, id, pattern.as_str()))
            .map_err(|e| {
                if e.is_unique_violation() {
                    duplicate(&pattern)
                } else {
                    e.into()
                }
            })?;
        if !updated {
            return Err(CdrError::not_found("Pattern", id));
        }
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        self.session.require(Action::EditNonMappablePatterns)?;
        if !self.db.with_conn(|conn| nomap_repo::delete(conn, id))? {
            return Err(CdrError::not_found("Pattern", id));
        }
        log::info!("{} deleted non-mappable pattern {}", self.session.user, id);
        Ok(())
    }

    /// Mappable unmapped labels a pattern would suppress, without changing
    /// anything.
    pub fn preview(&self, pattern: &str) -> Result<Vec<ExternalValue>> {
        let pattern = check_pattern(pattern)?;
        let rows = self.db.read(|conn| Ok(nomap_repo::list_unmapped(conn, None)?))?;
        Ok(rows
            .into_iter()
            .filter(|r| r.mappable && pattern.is_match(&r.value))
            .map(ExternalValue::from)
            .collect())
    }

    /// Marks every unmapped label matching any pattern never-mappable.
    /// Returns the number of labels changed.
    pub fn apply(&self) -> Result<usize> {
        self.session.require(Action::EditNonMappablePatterns)?;
        let changed = self.db.with_tx(|tx| {
            let now = time::now();
            let mut changed = 0;
            for row in nomap_repo::list(tx)? {
                changed += nomap_repo::apply(tx, &Wildcard::new(&row.pattern).to_like(), &now)?;
            }
            Ok(changed)
        })?;
        log::info!("Marked {} external labels non-mappable", changed);
        Ok(changed)
    }

    /// Adds a label to the external pool, for loaders and tests.
    pub fn record_value(&self, usage: &str, value: &str, doc_id: Option<DocId>) -> Result<i64> {
        let now = time::now();
        Ok(self
            .db
            .with_conn(|conn| nomap_repo::insert_value(conn, usage, value, doc_id, &now))?)
    }

    pub fn unmapped(&self, usage: Option<&str>) -> Result<Vec<ExternalValue>> {
        let rows = self.db.read(|conn| Ok(nomap_repo::list_unmapped(conn, usage)?))?;
        Ok(rows.into_iter().map(ExternalValue::from).collect())
    }
}
