//! The publishing job.
//!
//! Arguments: `subset` (required), `filters` (`|`-separated filter
//! references, required), and either `docs` (document ids) or `doc_type`.
//! `output_dir` sends output to files; `push=Y` updates the public
//! projection instead. Without either, a directory under the configured
//! output root is used.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info_span;

use super::{parse_doc_ids, parse_filter_refs};
use crate::docs::DocumentStore;
use crate::error::CdrError;
use crate::ids::{canonical, DocId, FilterRef, VersionSelector};
use crate::jobs::context::JobContext;
use crate::jobs::error::JobError;
use crate::jobs::handler::JobHandler;
use crate::jobs::PUBLISH_COMMAND;
use crate::pipeline::{FilterParams, FilterPipeline};
use crate::publishing::writer::LedgerWriter;
use crate::publishing::{PubJobStatus, PublicationLedger};
use crate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination<'a> {
    Directory(&'a Path),
    Push,
}

#[derive(Debug, Default)]
struct Tally {
    published: usize,
    removed: usize,
    skipped: usize,
    failed: usize,
}

impl Tally {
    fn summary(&self) -> String {
        format!(
            "{} published, {} removed, {} skipped, {} failed",
            self.published, self.removed, self.skipped, self.failed
        )
    }
}

pub struct PublishHandler {
    store: DocumentStore,
    pipeline: FilterPipeline,
    ledger: PublicationLedger,
    writer: LedgerWriter,
    output_root: Option<PathBuf>,
}

impl PublishHandler {
    pub fn new(
        store: DocumentStore,
        pipeline: FilterPipeline,
        ledger: PublicationLedger,
        writer: LedgerWriter,
    ) -> Self {
        Self {
            store,
            pipeline,
            ledger,
            writer,
            output_root: None,
        }
    }

    pub fn with_output_root(mut self, root: Option<PathBuf>) -> Self {
        self.output_root = root;
        self
    }

    fn documents(&self, ctx: &JobContext) -> Result<Vec<DocId>, JobError> {
        if let Some(list) = ctx.arg("docs") {
            return parse_doc_ids(list);
        }
        match ctx.arg("doc_type") {
            Some(doc_type) => Ok(self
                .store
                .list_by_type(doc_type.trim())?
                .into_iter()
                .map(|d| d.id)
                .collect()),
            None => Err(JobError::MissingArg("docs".to_string())),
        }
    }

    fn output_dir(&self, ctx: &JobContext) -> Result<Option<PathBuf>, JobError> {
        if ctx.arg("push").is_some_and(|v| v.eq_ignore_ascii_case("y")) {
            return Ok(None);
        }
        let job = ctx.job();
        let dir = match (ctx.arg("output_dir"), &self.output_root) {
            (Some(dir), Some(root)) => root.join(dir),
            (Some(dir), None) => PathBuf::from(dir),
            (None, Some(root)) => root.join(format!("{}-{}", job.name.replace(' ', "_"), job.id)),
            (None, None) => return Err(JobError::MissingArg("output_dir".to_string())),
        };
        Ok(Some(dir))
    }

    fn publish_all(
        &self,
        ctx: &JobContext,
        pub_job: i64,
        docs: &[DocId],
        refs: &[FilterRef],
        destination: Destination<'_>,
    ) -> Result<Tally, JobError> {
        let params = FilterParams::new();
        let mut tally = Tally::default();
        for (i, doc_id) in docs.iter().enumerate() {
            ctx.checkpoint()?;
            ctx.progress(&format!("{} of {} documents ({})", i, docs.len(), tally.summary()))?;
            let _span = info_span!("publish_doc", doc = %canonical(*doc_id)).entered();
            match self.publish_one(pub_job, *doc_id, refs, &params, destination) {
                Ok(Published::Pushed) => tally.published += 1,
                Ok(Published::Removed) => tally.removed += 1,
                Ok(Published::Skipped) => tally.skipped += 1,
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    tally.failed += 1;
                    log::warn!("{} not published: {}", canonical(*doc_id), e);
                    let version = self
                        .store
                        .get_doc(*doc_id, VersionSelector::Last)
                        .ok()
                        .and_then(|d| d.version)
                        .unwrap_or(0);
                    if self.store.exists(*doc_id)? {
                        self.writer
                            .record_event(pub_job, *doc_id, version, false, Some(&e.to_string()))?;
                    }
                }
            }
        }
        Ok(tally)
    }

    fn publish_one(
        &self,
        pub_job: i64,
        doc_id: DocId,
        refs: &[FilterRef],
        params: &FilterParams,
        destination: Destination<'_>,
    ) -> Result<Published, CdrError> {
        let cwd = self.store.get_doc(doc_id, VersionSelector::Current)?;
        if cwd.is_blocked() {
            return self.withdraw(pub_job, doc_id, destination);
        }
        let doc = self.store.get_doc(doc_id, VersionSelector::LastPublishable)?;
        let version = doc.version.unwrap_or(0);
        let cdr_id = canonical(doc_id);
        let result = self.pipeline.filter_xml(&doc.xml, refs, params)?.with_doc_id(&cdr_id);
        match destination {
            Destination::Directory(dir) => {
                let path = dir.join(format!("{}.xml", cdr_id));
                fs::write(&path, &result.body).map_err(|e| CdrError::io(&path, e))?;
                log::debug!("Wrote {}", sanitize::redact_path(&path));
                self.writer.record_event(pub_job, doc_id, version, false, None)?;
            }
            Destination::Push => self.writer.record_push(pub_job, doc_id, version, &result.body)?,
        }
        Ok(Published::Pushed)
    }

    /// Blocked documents come off the public site; output directories get
    /// nothing for them.
    ///
    /// A blocked document with versions newer than its last push is left
    /// on the site; its history reports it as needing versioning.
    fn withdraw(&self, pub_job: i64, doc_id: DocId, destination: Destination<'_>) -> Result<Published, CdrError> {
        if destination != Destination::Push {
            return Ok(Published::Skipped);
        }
        let Some(on_site) = self.ledger.projection_version(doc_id)? else {
            return Ok(Published::Skipped);
        };
        let pushed = self
            .ledger
            .last_publication(doc_id)?
            .map_or(on_site, |p| p.doc_version);
        let latest = self
            .store
            .list_versions(doc_id)?
            .next()
            .transpose()?
            .map_or(0, |v| v.num);
        if latest > pushed {
            log::info!(
                "{} needs versioning to be removed (version {} pushed, latest {})",
                canonical(doc_id),
                pushed,
                latest
            );
            return Ok(Published::Skipped);
        }
        self.writer.record_removal(pub_job, doc_id, on_site)?;
        Ok(Published::Removed)
    }
}

enum Published {
    Pushed,
    Removed,
    Skipped,
}

impl JobHandler for PublishHandler {
    fn command(&self) -> &'static str {
        PUBLISH_COMMAND
    }

    fn run(&self, ctx: &JobContext) -> Result<String, JobError> {
        let subset = ctx.require_arg("subset")?.trim().to_string();
        let refs = parse_filter_refs(ctx.require_arg("filters")?)?;
        if refs.is_empty() {
            return Err(JobError::MissingArg("filters".to_string()));
        }
        let docs = self.documents(ctx)?;
        let output_dir = self.output_dir(ctx)?;
        if let Some(dir) = &output_dir {
            fs::create_dir_all(dir).map_err(|e| CdrError::io(dir, e))?;
        }

        let dir_text = output_dir.as_ref().map(|d| d.to_string_lossy().into_owned());
        let pub_job = self
            .writer
            .create_job(&subset, dir_text.as_deref(), &ctx.job().requested_by)?;
        let destination = match &output_dir {
            Some(dir) => Destination::Directory(dir),
            None => Destination::Push,
        };

        match self.publish_all(ctx, pub_job, &docs, &refs, destination) {
            Ok(tally) => {
                let summary = tally.summary();
                self.writer.finish_job(pub_job, PubJobStatus::Success, Some(&summary))?;
                Ok(format!("Publication job {}: {}", pub_job, summary))
            }
            Err(e) => {
                let status = match e {
                    JobError::Cancelled => PubJobStatus::Cancelled,
                    _ => PubJobStatus::Failure,
                };
                if let Err(finish) = self.writer.finish_job(pub_job, status, Some(&e.to_string())) {
                    log::error!("Could not close publication job {}: {}", pub_job, finish);
                }
                Err(e)
            }
        }
    }
}
