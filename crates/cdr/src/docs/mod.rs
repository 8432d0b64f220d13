//! Document Store: documents, their immutable versions, the audit trail and
//! the link index.

pub mod history;
pub mod link_index;
pub mod query;
pub mod store;
pub mod title;
pub mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CdrError, ValidationMessage};
use crate::ids::DocId;

pub use history::{RemovalStatus, VersionHistory, VersionHistoryRow};
pub use query::{Colocation, IndexQuery, IndexRow, IndexTerm, TextMatch, UnpublishedChange};
pub use store::{DocumentStore, VersionIter};
pub use validate::{SchemaValidator, WellFormedValidator};

/// Document type of filters.
pub const FILTER_DOC_TYPE: &str = "Filter";

/// Title stored when none is given and none can be derived.
pub const NO_TITLE: &str = "[No title]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveStatus {
    Active,
    /// Blocked from publication.
    Inactive,
}

impl ActiveStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ActiveStatus::Active => "A",
            ActiveStatus::Inactive => "I",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CdrError> {
        match code {
            "A" => Ok(ActiveStatus::Active),
            "I" => Ok(ActiveStatus::Inactive),
            other => Err(CdrError::InvariantViolation(format!(
                "unknown active status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ActiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveStatus::Active => write!(f, "Active"),
            ActiveStatus::Inactive => write!(f, "Inactive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValStatus {
    Valid,
    Invalid,
    Unvalidated,
}

impl ValStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ValStatus::Valid => "V",
            ValStatus::Invalid => "I",
            ValStatus::Unvalidated => "U",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CdrError> {
        match code {
            "V" => Ok(ValStatus::Valid),
            "I" => Ok(ValStatus::Invalid),
            "U" => Ok(ValStatus::Unvalidated),
            other => Err(CdrError::InvariantViolation(format!(
                "unknown validation status '{}'",
                other
            ))),
        }
    }
}

/// When `save_doc` appends a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreateVersion {
    #[default]
    Never,
    Always,
    /// Only when the body differs from the latest version.
    OnChange,
}

/// A document body with its metadata, as read by `get_doc`.
///
/// `version` is `None` for the current working document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub doc_type: String,
    pub title: String,
    pub xml: String,
    pub active_status: ActiveStatus,
    pub val_status: ValStatus,
    pub version: Option<u32>,
    pub publishable: Option<bool>,
    pub comment: Option<String>,
    pub created_at: String,
    pub created_by: String,
    pub modified_at: Option<String>,
    pub modified_by: Option<String>,
    pub checked_out_by: Option<String>,
}

impl Document {
    pub fn is_blocked(&self) -> bool {
        self.active_status == ActiveStatus::Inactive
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub doc_type: String,
    pub title: Option<String>,
    pub xml: String,
}

impl NewDocument {
    pub fn new(doc_type: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            title: None,
            xml: xml.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub create_version: CreateVersion,
    pub publishable: bool,
    pub check_in: bool,
    pub validate: bool,
    pub comment: Option<String>,
}

impl SaveOptions {
    /// Options that append a new version, checked in.
    pub fn versioned(comment: impl Into<String>) -> Self {
        Self {
            create_version: CreateVersion::Always,
            check_in: true,
            comment: Some(comment.into()),
            ..Default::default()
        }
    }
}

/// Result of a successful save. `warnings` carries non-fatal validation
/// messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub doc_id: DocId,
    pub version: Option<u32>,
    pub warnings: Vec<ValidationMessage>,
}

/// One row of `list_versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub num: u32,
    pub comment: Option<String>,
    pub user: String,
    pub created_at: String,
    pub val_status: ValStatus,
    pub publishable: bool,
}

/// Identity columns for document pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSummary {
    pub id: DocId,
    pub doc_type: String,
    pub title: String,
    pub active_status: ActiveStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for s in [ActiveStatus::Active, ActiveStatus::Inactive] {
            assert_eq!(ActiveStatus::from_code(s.code()).unwrap(), s);
        }
        for s in [ValStatus::Valid, ValStatus::Invalid, ValStatus::Unvalidated] {
            assert_eq!(ValStatus::from_code(s.code()).unwrap(), s);
        }
        assert!(ActiveStatus::from_code("X").is_err());
    }

    #[test]
    fn test_versioned_options() {
        let opts = SaveOptions::versioned("fix typo");
        assert_eq!(opts.create_version, CreateVersion::Always);
        assert!(opts.check_in);
        assert!(!opts.publishable);
    }
}
