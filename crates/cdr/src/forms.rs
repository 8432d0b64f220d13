//! Typed request records parsed from CGI key/value pairs.
//!
//! Every record rejects fields it does not know. The `Session` and
//! `Request` envelope keys are consumed by the web tier and ignored here.
//! Numbered custom parameters (`parm-name-N` / `parm-value-N`) are folded
//! into a `custom` list before the record is deserialized.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{CdrError, Result};
use crate::filters::FilterSetSpec;
use crate::ids::{CdrId, DocId, FilterRef, VersionSelector};
use crate::jobs::{BatchStatus, JobQuery};
use crate::pipeline::{CommentDisplay, QcReportOptions};

const ENVELOPE_KEYS: [&str; 2] = ["Session", "Request"];
const PARM_COUNT: &str = "parm-count";
const PARM_NAME: &str = "parm-name-";
const PARM_VALUE: &str = "parm-value-";

/// A request record with checks beyond its field types.
pub trait FormRecord: DeserializeOwned {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Repeated keys become arrays; custom parameter pairs become `custom`.
fn to_object(pairs: &[(String, String)]) -> Value {
    let mut object = Map::new();
    let mut names: BTreeMap<u32, String> = BTreeMap::new();
    let mut values: BTreeMap<u32, String> = BTreeMap::new();

    for (key, value) in pairs {
        if ENVELOPE_KEYS.contains(&key.as_str()) || key == PARM_COUNT {
            continue;
        }
        if let Some(n) = key.strip_prefix(PARM_NAME).and_then(|n| n.parse().ok()) {
            names.insert(n, value.trim().to_string());
            continue;
        }
        if let Some(n) = key.strip_prefix(PARM_VALUE).and_then(|n| n.parse().ok()) {
            values.insert(n, value.trim().to_string());
            continue;
        }
        let value = Value::String(value.clone());
        match object.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.clone(), value);
            }
        }
    }

    let custom: Vec<Value> = names
        .into_iter()
        .filter(|(_, name)| !name.is_empty())
        .map(|(n, name)| {
            let value = values.remove(&n).unwrap_or_default();
            Value::Array(vec![Value::String(name), Value::String(value)])
        })
        .collect();
    if !custom.is_empty() {
        object.insert("custom".to_string(), Value::Array(custom));
    }
    Value::Object(object)
}

/// Parses a record from submitted form fields.
pub fn parse_form<T: FormRecord>(pairs: &[(String, String)]) -> Result<T> {
    let record: T = serde_json::from_value(to_object(pairs))
        .map_err(|e| CdrError::InvalidInput(format!("invalid form: {}", e)))?;
    record.check()?;
    Ok(record)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    let text = String::deserialize(d)?;
    match text.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "false" | "off" | "0" | "" => Ok(false),
        other => Err(D::Error::custom(format!("invalid flag '{}'", other))),
    }
}

fn yes() -> bool {
    true
}

fn de_doc_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<DocId, D::Error> {
    let text = String::deserialize(d)?;
    CdrId::parse(&text).map(|p| p.id).map_err(D::Error::custom)
}

fn de_opt_doc_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<DocId>, D::Error> {
    let text = String::deserialize(d)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    CdrId::parse(&text).map(|p| Some(p.id)).map_err(D::Error::custom)
}

/// `0` and blank select the working document.
fn de_version<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<VersionSelector, D::Error> {
    let text = String::deserialize(d)?;
    match text.trim() {
        "" | "0" => Ok(VersionSelector::Current),
        other => VersionSelector::parse(other).map_err(D::Error::custom),
    }
}

fn de_filter_refs<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<FilterRef>, D::Error> {
    OneOrMany::deserialize(d)?
        .into_vec()
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| FilterRef::parse(s).map_err(D::Error::custom))
        .collect()
}

fn de_opt_parse<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let text = String::deserialize(d)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(D::Error::custom)
}

fn de_opt_status<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<BatchStatus>, D::Error> {
    let text = String::deserialize(d)?;
    if text.trim().is_empty() || text.trim().eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    BatchStatus::parse(&text).map(Some).map_err(D::Error::custom)
}

fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let text = String::deserialize(d)?;
    let trimmed = text.trim();
    Ok(Some(trimmed.to_string()).filter(|t| !t.is_empty()))
}

/// The filter / QC report form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRequest {
    #[serde(rename = "DocId", deserialize_with = "de_doc_id")]
    pub doc_id: DocId,
    #[serde(rename = "DocVer", default, deserialize_with = "de_version")]
    pub version: VersionSelector,
    #[serde(rename = "filter", alias = "Filter", default, deserialize_with = "de_filter_refs")]
    pub filters: Vec<FilterRef>,
    #[serde(default)]
    pub custom: Vec<(String, String)>,
    #[serde(default, deserialize_with = "de_flag")]
    pub validate: bool,
    /// Schema to validate against; the document type's own by default.
    #[serde(rename = "newdtd", default, deserialize_with = "de_opt_text")]
    pub schema: Option<String>,
    #[serde(rename = "qcFilterSets", default, deserialize_with = "de_flag")]
    pub qc_filter_sets: bool,

    #[serde(default, deserialize_with = "de_flag")]
    pub publish: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub approved: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub proposed: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub rejected: bool,
    #[serde(rename = "rsmarkup", default = "yes", deserialize_with = "de_flag")]
    pub redline_strikeout: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub internal: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub external: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub glossary: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub images: bool,
    #[serde(rename = "stdword", default, deserialize_with = "de_flag")]
    pub standard_wording: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub editorial: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub advisory: bool,
    #[serde(rename = "glosspatient", default, deserialize_with = "de_flag")]
    pub gloss_patient: bool,
    #[serde(rename = "glosshp", default, deserialize_with = "de_flag")]
    pub gloss_hp: bool,
    #[serde(rename = "ispp", default, deserialize_with = "de_flag")]
    pub is_pp: bool,
    #[serde(rename = "isqc", default, deserialize_with = "de_flag")]
    pub is_qc: bool,
    #[serde(rename = "loeref", default, deserialize_with = "de_flag")]
    pub loe_terms: bool,
    #[serde(rename = "QC", default, deserialize_with = "de_flag")]
    pub qc: bool,
    #[serde(rename = "vendorOrQC", default, deserialize_with = "de_opt_text")]
    pub vendor_or_qc: Option<String>,
}

impl FormRecord for FilterRequest {
    fn check(&self) -> Result<()> {
        if self.filters.is_empty() && !self.qc_filter_sets {
            return Err(CdrError::InvalidInput("at least one filter is required".to_string()));
        }
        Ok(())
    }
}

impl FilterRequest {
    pub fn qc_options(&self) -> QcReportOptions {
        let levels = [
            ("publish", self.publish),
            ("approved", self.approved),
            ("proposed", self.proposed),
            ("rejected", self.rejected),
        ];
        let boards = [("editorial-board", self.editorial), ("advisory-board", self.advisory)];
        let audiences = [("patient", self.gloss_patient), ("hp", self.gloss_hp)];
        let selected = |items: &[(&str, bool)]| -> Vec<String> {
            items.iter().filter(|(_, on)| *on).map(|(n, _)| n.to_string()).collect()
        };
        QcReportOptions {
            markup_levels: selected(&levels),
            redline_strikeout: self.redline_strikeout,
            comments: CommentDisplay::from_selection(self.internal, self.external),
            glossary: self.glossary,
            images: self.images,
            standard_wording: self.standard_wording,
            boards: selected(&boards),
            audiences: selected(&audiences),
            is_pp: self.is_pp,
            is_qc: self.is_qc,
            loe_terms: self.loe_terms,
            vendor_or_qc: self.qc || self.vendor_or_qc.is_some(),
            custom: self.custom.clone(),
        }
    }
}

/// The document version history form: an id or a title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionHistoryRequest {
    #[serde(rename = "DocId", default, deserialize_with = "de_opt_doc_id")]
    pub doc_id: Option<DocId>,
    #[serde(rename = "DocTitle", default, deserialize_with = "de_opt_text")]
    pub title: Option<String>,
}

impl FormRecord for VersionHistoryRequest {
    fn check(&self) -> Result<()> {
        if self.doc_id.is_none() && self.title.is_none() {
            return Err(CdrError::InvalidInput("a document id or title is required".to_string()));
        }
        Ok(())
    }
}

/// The batch job status form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchStatusRequest {
    #[serde(rename = "jobId", default, deserialize_with = "de_opt_parse")]
    pub job_id: Option<i64>,
    #[serde(rename = "jobName", default, deserialize_with = "de_opt_text")]
    pub job_name: Option<String>,
    #[serde(rename = "jobAge", default, deserialize_with = "de_opt_parse")]
    pub job_age: Option<u32>,
    #[serde(rename = "jobStatus", default, deserialize_with = "de_opt_status")]
    pub job_status: Option<BatchStatus>,
}

impl FormRecord for BatchStatusRequest {}

impl BatchStatusRequest {
    pub fn to_query(&self) -> JobQuery {
        JobQuery {
            id: self.job_id,
            name: self.job_name.clone(),
            age_days: self.job_age,
            status: self.job_status,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct MemberEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

/// The filter set editor form. `members` is a JSON list of
/// `{"type": "filter"|"set", "name": ...}` entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSetForm {
    #[serde(default, deserialize_with = "de_opt_parse")]
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub notes: Option<String>,
    #[serde(default)]
    pub members: String,
}

impl FormRecord for FilterSetForm {}

impl FilterSetForm {
    pub fn to_spec(&self) -> Result<FilterSetSpec> {
        let entries: Vec<MemberEntry> = if self.members.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.members)
                .map_err(|e| CdrError::InvalidInput(format!("invalid members list: {}", e)))?
        };
        let mut members = Vec::with_capacity(entries.len());
        for entry in entries {
            let kinds: Vec<&str> = entry.kind.split_whitespace().collect();
            let name = entry.name.trim().to_string();
            if kinds.contains(&"filter") {
                members.push(FilterRef::Name(name));
            } else if kinds.contains(&"set") {
                members.push(FilterRef::SetName(name));
            } else {
                return Err(CdrError::InvalidInput(format!(
                    "unrecognized member type '{}'",
                    entry.kind
                )));
            }
        }
        let mut spec = FilterSetSpec::new(self.name.trim(), self.description.trim(), members);
        spec.notes = self.notes.clone();
        Ok(spec)
    }
}
