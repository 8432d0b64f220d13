use std::time::Duration;

use thiserror::Error;

use crate::error::CdrError;
use crate::ids::{canonical, DocId};

/// Failures reported by a [`FilterEngine`](super::FilterEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),

    #[error("filter did not finish within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("could not start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Attaches the stage's filter id.
    pub fn at_stage(self, filter: DocId) -> CdrError {
        match self {
            EngineError::Timeout(limit) => CdrError::Timeout(format!(
                "filter {} exceeded {}ms",
                canonical(filter),
                limit.as_millis()
            )),
            other => CdrError::FilterExecution {
                filter_id: canonical(filter),
                message: other.to_string(),
            },
        }
    }
}
