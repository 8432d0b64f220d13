//! Document ids, version selectors, and filter references.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CdrError;

/// Integer primary key of a document.
pub type DocId = i64;

static RE_CDR_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:CDR)?(\d{1,10})(?:#([^\s/]+)|/(\d+))?\s*$").unwrap()
});

/// A parsed document id such as `CDR0000012345#_17` or `CDR12345/4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CdrId {
    pub id: DocId,
    pub fragment: Option<String>,
    pub version: Option<u32>,
}

impl CdrId {
    pub fn new(id: DocId) -> Self {
        Self {
            id,
            fragment: None,
            version: None,
        }
    }

    /// Parses `CDR` + 1-10 digits (or bare digits), optionally followed by
    /// `#fragment` or `/version`.
    pub fn parse(text: &str) -> Result<Self, CdrError> {
        let caps = RE_CDR_ID
            .captures(text)
            .ok_or_else(|| CdrError::InvalidInput(format!("invalid document id '{}'", text)))?;
        let id: DocId = caps[1]
            .parse()
            .map_err(|_| CdrError::InvalidInput(format!("invalid document id '{}'", text)))?;
        if id == 0 {
            return Err(CdrError::InvalidInput(format!(
                "invalid document id '{}'",
                text
            )));
        }
        let version = match caps.get(3) {
            Some(v) => {
                let num: u32 = v.as_str().parse().map_err(|_| {
                    CdrError::InvalidInput(format!("invalid version in '{}'", text))
                })?;
                if num == 0 {
                    return Err(CdrError::InvalidInput(format!(
                        "invalid version in '{}'",
                        text
                    )));
                }
                Some(num)
            }
            None => None,
        };
        Ok(Self {
            id,
            fragment: caps.get(2).map(|m| m.as_str().to_string()),
            version,
        })
    }

    /// `CDR` followed by the id zero-padded to ten digits.
    pub fn canonical(&self) -> String {
        canonical(self.id)
    }
}

/// Canonical display form of a document id.
pub fn canonical(id: DocId) -> String {
    format!("CDR{:010}", id)
}

impl fmt::Display for CdrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())?;
        if let Some(ref frag) = self.fragment {
            write!(f, "#{}", frag)?;
        }
        if let Some(v) = self.version {
            write!(f, "/{}", v)?;
        }
        Ok(())
    }
}

impl FromStr for CdrId {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CdrId::parse(s)
    }
}

/// Which body of a document to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersionSelector {
    /// A specific version number (>= 1).
    Number(u32),
    /// The highest version number.
    Last,
    /// The highest publishable version number.
    LastPublishable,
    /// The current working document.
    #[default]
    Current,
}

impl VersionSelector {
    pub fn parse(text: &str) -> Result<Self, CdrError> {
        let trimmed = text.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "last" => Ok(VersionSelector::Last),
            "lastp" => Ok(VersionSelector::LastPublishable),
            "cwd" | "" => Ok(VersionSelector::Current),
            other => match other.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(VersionSelector::Number(n)),
                _ => Err(CdrError::InvalidInput(format!(
                    "invalid version selector '{}'",
                    trimmed
                ))),
            },
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Number(n) => write!(f, "{}", n),
            VersionSelector::Last => write!(f, "last"),
            VersionSelector::LastPublishable => write!(f, "lastp"),
            VersionSelector::Current => write!(f, "cwd"),
        }
    }
}

impl FromStr for VersionSelector {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionSelector::parse(s)
    }
}

/// A reference to a filter or a filter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterRef {
    Id(DocId),
    Name(String),
    SetName(String),
}

impl FilterRef {
    /// Parses `CDR##########`, `name:TEXT`, or `set:TEXT`.
    pub fn parse(text: &str) -> Result<Self, CdrError> {
        let trimmed = text.trim();
        if let Some(rest) = strip_prefix_ci(trimmed, "name:") {
            let name = rest.trim();
            if name.is_empty() {
                return Err(CdrError::InvalidInput("empty filter name".to_string()));
            }
            return Ok(FilterRef::Name(name.to_string()));
        }
        if let Some(rest) = strip_prefix_ci(trimmed, "set:") {
            let name = rest.trim();
            if name.is_empty() {
                return Err(CdrError::InvalidInput("empty filter set name".to_string()));
            }
            return Ok(FilterRef::SetName(name.to_string()));
        }
        let parsed = CdrId::parse(trimmed).map_err(|_| {
            CdrError::InvalidInput(format!("invalid filter reference '{}'", trimmed))
        })?;
        Ok(FilterRef::Id(parsed.id))
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

impl fmt::Display for FilterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRef::Id(id) => write!(f, "{}", canonical(*id)),
            FilterRef::Name(name) => write!(f, "name:{}", name),
            FilterRef::SetName(name) => write!(f, "set:{}", name),
        }
    }
}

impl FromStr for FilterRef {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterRef::parse(s)
    }
}
