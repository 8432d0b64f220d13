//! Filter Registry: named filters and nestable filter sets.

pub mod expand;
pub mod includes;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::ids::{DocId, FilterRef};

pub use expand::SetGraph;
pub use includes::FilterInclude;
pub use registry::{ExpansionCache, FilterRegistry};

pub const MAX_SET_NAME_CHARS: usize = 80;
pub const MAX_SET_DESCRIPTION_CHARS: usize = 256;

/// A filter document, identified by id and its unique name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub id: DocId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSetSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// One member of a set as stored, with display names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterSetMember {
    Filter { id: DocId, name: String },
    Set { id: i64, name: String },
}

impl FilterSetMember {
    /// The reference form of this member.
    pub fn as_ref(&self) -> FilterRef {
        match self {
            FilterSetMember::Filter { id, .. } => FilterRef::Id(*id),
            FilterSetMember::Set { name, .. } => FilterRef::SetName(name.clone()),
        }
    }
}

/// A set with its direct members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub notes: Option<String>,
    pub members: Vec<FilterSetMember>,
}

/// Desired state of a set for `put_filter_set`. Filter members may be
/// given by id or by name; set members by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSetSpec {
    pub name: String,
    pub description: String,
    pub notes: Option<String>,
    pub members: Vec<FilterRef>,
}

impl FilterSetSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, members: Vec<FilterRef>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            notes: None,
            members,
        }
    }
}

/// A set with nested sets expanded in place, for the deep set report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTree {
    pub id: i64,
    pub name: String,
    pub members: Vec<SetTreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetTreeNode {
    Filter(FilterSummary),
    Set(SetTree),
}

impl SetTree {
    /// Filter ids in expansion order.
    pub fn leaves(&self) -> Vec<DocId> {
        let mut out = Vec::new();
        for node in &self.members {
            match node {
                SetTreeNode::Filter(f) => out.push(f.id),
                SetTreeNode::Set(sub) => out.extend(sub.leaves()),
            }
        }
        out
    }
}
