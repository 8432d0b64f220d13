use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// Severity of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// One `(level, line, message)` entry from schema validation or a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub level: Severity,
    pub line: Option<u32>,
    pub message: String,
}

impl ValidationMessage {
    pub fn error(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            level: Severity::Error,
            line,
            message: message.into(),
        }
    }

    pub fn warning(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            level: Severity::Warning,
            line,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Severity::Error
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", self.level, line, self.message),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum CdrError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Unknown filter set: {0}")]
    UnknownFilterSet(String),

    #[error("Filter set cycle: {}", .0.join(" -> "))]
    FilterSetCycle(Vec<String>),

    #[error("Document {0} has no versions")]
    NoVersions(String),

    #[error("Document {0} has no publishable version")]
    NoPublishableVersion(String),

    #[error("Validation failed: {}", format_messages(.0))]
    ValidationErrors(Vec<ValidationMessage>),

    #[error("Filter {filter_id} failed: {message}")]
    FilterExecution { filter_id: String, message: String },

    #[error("A '{job_name}' job is already active (job {active_job})")]
    ConcurrencyConflict { job_name: String, active_job: i64 },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_messages(messages: &[ValidationMessage]) -> String {
    messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CdrError {
    pub fn not_found(what: &'static str, id: impl fmt::Display) -> Self {
        CdrError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CdrError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable name of the error kind, suitable for status pages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CdrError::NotFound { .. } => "NotFound",
            CdrError::UnknownFilter(_) => "UnknownFilter",
            CdrError::UnknownFilterSet(_) => "UnknownFilterSet",
            CdrError::FilterSetCycle(_) => "FilterSetCycle",
            CdrError::NoVersions(_) => "NoVersions",
            CdrError::NoPublishableVersion(_) => "NoPublishableVersion",
            CdrError::ValidationErrors(_) => "ValidationErrors",
            CdrError::FilterExecution { .. } => "FilterExecutionError",
            CdrError::ConcurrencyConflict { .. } => "ConcurrencyConflict",
            CdrError::Timeout(_) => "Timeout",
            CdrError::PermissionDenied(_) => "PermissionDenied",
            CdrError::InvariantViolation(_) => "InvariantViolation",
            CdrError::InvalidInput(_) => "InvalidInput",
            CdrError::Database(_) => "Database",
            CdrError::Config(_) => "Config",
            CdrError::Io { .. } => "Io",
        }
    }

    /// Message safe to show the caller.
    ///
    /// Permission failures and tampered input render a generic message; the
    /// detail goes to the log only.
    pub fn user_message(&self) -> String {
        match self {
            CdrError::PermissionDenied(detail) => {
                log::warn!("Permission denied: {}", detail);
                "You are not authorized to perform this action".to_string()
            }
            CdrError::Database(e) => {
                log::error!("Database failure: {}", e);
                "The document repository is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for failures worth retrying: lock timeouts and external calls
    /// that ran out of time.
    pub fn is_transient(&self) -> bool {
        match self {
            CdrError::Timeout(_) => true,
            CdrError::Database(e) => e.is_busy(),
            _ => false,
        }
    }
}

impl From<DatabaseError> for CdrError {
    fn from(e: DatabaseError) -> Self {
        if e.is_busy() {
            CdrError::Timeout(format!("database lock wait exceeded: {}", e))
        } else {
            CdrError::Database(e)
        }
    }
}

impl From<rusqlite::Error> for CdrError {
    fn from(e: rusqlite::Error) -> Self {
        CdrError::from(DatabaseError::from(e))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown tier '{0}'")]
    UnknownTier(String),
}

pub type Result<T> = std::result::Result<T, CdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(CdrError::UnknownFilter("x".into()).kind(), "UnknownFilter");
        assert_eq!(
            CdrError::FilterExecution {
                filter_id: "CDR0000000001".into(),
                message: "boom".into()
            }
            .kind(),
            "FilterExecutionError"
        );
        assert_eq!(
            CdrError::ConcurrencyConflict {
                job_name: "Weekly".into(),
                active_job: 3
            }
            .kind(),
            "ConcurrencyConflict"
        );
    }

    #[test]
    fn test_permission_denied_user_message_is_generic() {
        let err = CdrError::PermissionDenied("session abc lacks MODIFY FILTER SET".into());
        let msg = err.user_message();
        assert!(!msg.contains("abc"));
        assert!(!msg.contains("MODIFY"));
    }

    #[test]
    fn test_validation_errors_display_lists_messages() {
        let err = CdrError::ValidationErrors(vec![
            ValidationMessage::error(Some(3), "unexpected element"),
            ValidationMessage::warning(None, "empty title"),
        ]);
        let text = err.to_string();
        assert!(text.contains("Error (line 3): unexpected element"));
        assert!(text.contains("Warning: empty title"));
    }

    #[test]
    fn test_busy_database_maps_to_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = CdrError::from(busy);
        assert_eq!(err.kind(), "Timeout");
        assert!(err.is_transient());
    }
}
