//! The seam to the external XSLT engine.

use std::collections::BTreeMap;

use super::error::EngineError;
use crate::ids::DocId;

/// Parameters passed unchanged to every stage of a pipeline run.
pub type FilterParams = BTreeMap<String, String>;

/// One filter about to be applied.
#[derive(Debug, Clone, Copy)]
pub struct FilterScript<'a> {
    pub id: DocId,
    pub name: &'a str,
    pub body: &'a str,
}

/// What one stage produced: the transformed document and any messages the
/// filter emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub body: String,
    pub messages: Vec<String>,
}

/// Applies a single filter to a document body.
///
/// Implementations must be deterministic: the same script, input and
/// parameters yield the same output and messages.
pub trait FilterEngine: Send + Sync {
    fn apply(
        &self,
        filter: &FilterScript<'_>,
        input: &str,
        params: &FilterParams,
    ) -> Result<EngineOutput, EngineError>;
}
