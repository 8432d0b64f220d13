//! Caller sessions and action rights.
//!
//! Session lookup itself belongs to the web tier; the core only receives
//! the resolved user and the set of actions that user may perform.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CdrError;
use crate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    AddDocument,
    ModifyDocument,
    ModifyFilterSet,
    SetSysValue,
    UsePublishingSystem,
    EditNonMappablePatterns,
    GlobalChange,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::AddDocument,
        Action::ModifyDocument,
        Action::ModifyFilterSet,
        Action::SetSysValue,
        Action::UsePublishingSystem,
        Action::EditNonMappablePatterns,
        Action::GlobalChange,
    ];

    /// Name of the right as stored in the authorization tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AddDocument => "ADD DOCUMENT",
            Action::ModifyDocument => "MODIFY DOCUMENT",
            Action::ModifyFilterSet => "MODIFY FILTER SET",
            Action::SetSysValue => "SET_SYS_VALUE",
            Action::UsePublishingSystem => "USE PUBLISHING SYSTEM",
            Action::EditNonMappablePatterns => "EDIT NON-MAPPABLE PATTERNS",
            Action::GlobalChange => "GLOBAL CHANGE",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque session token. Never logged.
    pub name: String,
    pub user: String,
    actions: BTreeSet<Action>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            actions: actions.into_iter().collect(),
        }
    }

    /// Session used by background workers; holds every right.
    pub fn system() -> Self {
        Self::new("system", "system", Action::ALL)
    }

    /// Stand-in for the session token in log lines.
    pub fn log_key(&self) -> String {
        sanitize::hash_session(&self.name)
    }

    pub fn can_do(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn require(&self, action: Action) -> Result<(), CdrError> {
        if self.can_do(action) {
            Ok(())
        } else {
            log::warn!("Session {} denied {}", self.log_key(), action);
            Err(CdrError::PermissionDenied(format!(
                "user '{}' lacks {}",
                self.user, action
            )))
        }
    }
}
