//! Shared utilities for the cdr integration tests.
//!
//! - `TestHarness`: a file-backed database in a temp directory with a
//!   deterministic filter engine and a recording notifier
//! - builders for documents, filter sets and audio deliveries

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{TagEngine, TestHarness};
