//! Built-in job handlers.

pub mod global_change;
pub mod publish;
pub mod unpublished;

pub use global_change::GlobalChangeHandler;
pub use publish::PublishHandler;
pub use unpublished::UnpublishedReportHandler;

use std::sync::Arc;

use super::error::JobError;
use super::handler::HandlerRegistry;
use crate::ids::{CdrId, DocId, FilterRef};

/// Splits a list argument on commas, semicolons and whitespace.
fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_doc_ids(text: &str) -> Result<Vec<DocId>, JobError> {
    let mut ids = Vec::new();
    for part in split_list(text) {
        let id = CdrId::parse(part)?.id;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Filter references are separated by `|` so set names may contain spaces.
pub(crate) fn parse_filter_refs(text: &str) -> Result<Vec<FilterRef>, JobError> {
    text.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| FilterRef::parse(s).map_err(JobError::from))
        .collect()
}

/// Registry holding every built-in handler.
pub fn builtin(
    publish: PublishHandler,
    global_change: GlobalChangeHandler,
    unpublished: UnpublishedReportHandler,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(Arc::new(publish))
        .register(Arc::new(global_change))
        .register(Arc::new(unpublished));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_doc_ids() {
        let ids = parse_doc_ids("CDR0000000042, 7;cdr43 42").unwrap();
        assert_eq!(ids, vec![42, 7, 43]);
        assert!(parse_doc_ids("CDRx").is_err());
    }

    #[test]
    fn test_parse_filter_refs() {
        let refs = parse_filter_refs("set:Vendor Filters | name:Denormalize Summary|CDR0000000010").unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0], FilterRef::SetName("Vendor Filters".into()));
        assert_eq!(refs[2], FilterRef::Id(10));
    }
}
