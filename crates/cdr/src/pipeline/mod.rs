//! Filter Pipeline: serial composition of filters over document bodies.

pub mod engine;
pub mod error;
pub mod params;
pub mod process_engine;
pub mod runner;

pub use engine::{EngineOutput, FilterEngine, FilterParams, FilterScript};
pub use error::EngineError;
pub use params::{CommentDisplay, QcReportOptions};
pub use process_engine::ProcessEngine;
pub use runner::{FilterPipeline, FilterResult, ValidationResult, DOC_ID_PLACEHOLDER};
