//! Report of documents edited since their last publishable version.
//! Arguments: `output` (file path, required) and optional `doc_type`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::docs::{DocumentStore, UnpublishedChange};
use crate::error::CdrError;
use crate::jobs::context::JobContext;
use crate::jobs::error::JobError;
use crate::jobs::handler::JobHandler;
use crate::jobs::UNPUBLISHED_REPORT_COMMAND;
use crate::time;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    generated_at: String,
    doc_type: Option<&'a str>,
    documents: &'a [UnpublishedChange],
}

pub struct UnpublishedReportHandler {
    store: DocumentStore,
}

impl UnpublishedReportHandler {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

fn write_report(path: &Path, report: &Report<'_>) -> Result<(), CdrError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CdrError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| CdrError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| CdrError::io(path, e.into()))?;
    writer.flush().map_err(|e| CdrError::io(path, e))
}

impl JobHandler for UnpublishedReportHandler {
    fn command(&self) -> &'static str {
        UNPUBLISHED_REPORT_COMMAND
    }

    fn run(&self, ctx: &JobContext) -> Result<String, JobError> {
        let output = Path::new(ctx.require_arg("output")?.trim());
        let doc_type = ctx.arg("doc_type").map(str::trim).filter(|t| !t.is_empty());
        ctx.progress("collecting changed documents")?;
        let documents = self.store.unpublished_changes(doc_type)?;
        ctx.checkpoint()?;
        write_report(
            output,
            &Report {
                generated_at: time::now(),
                doc_type,
                documents: &documents,
            },
        )?;
        Ok(format!(
            "{} documents with unpublished changes written to {}",
            documents.len(),
            output.display()
        ))
    }
}
