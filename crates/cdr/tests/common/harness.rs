//! Isolated environment for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use cdr::config::Timeouts;
use cdr::docs::{NewDocument, SaveOptions, FILTER_DOC_TYPE};
use cdr::jobs::handlers::{self, GlobalChangeHandler, PublishHandler, UnpublishedReportHandler};
use cdr::jobs::{HandlerRegistry, JobController, RecordingSink, RetryPolicy};
use cdr::pipeline::{EngineError, EngineOutput, FilterParams, FilterScript};
use cdr::{
    Action, Database, DocId, DocumentStore, FilterEngine, FilterPipeline, RequestContext,
    Session, WellFormedValidator,
};

/// Deterministic stand-in for the XSLT engine.
///
/// A filter whose body is `FAIL` reports an error. Any other filter
/// appends `<!--name-->` to the input and emits one message naming the
/// filter and the parameters it received.
#[derive(Default)]
pub struct TagEngine {
    calls: AtomicUsize,
    applied: Mutex<Vec<DocId>>,
}

impl TagEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Filter ids in the order they were applied.
    pub fn applied(&self) -> Vec<DocId> {
        self.applied.lock().unwrap().clone()
    }
}

impl FilterEngine for TagEngine {
    fn apply(
        &self,
        filter: &FilterScript<'_>,
        input: &str,
        params: &FilterParams,
    ) -> Result<EngineOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.applied.lock().unwrap().push(filter.id);
        if filter.body.trim() == "FAIL" {
            return Err(EngineError::Failed(format!("{} refused the input", filter.name)));
        }
        let params: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        Ok(EngineOutput {
            body: format!("{}<!--{}-->", input, filter.name),
            messages: vec![format!("{} [{}]", filter.name, params.join(","))],
        })
    }
}

/// Routes spans and log records to the test writer. Later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A temp directory holding `cdr.db`, plus the collaborators every test
/// needs.
pub struct TestHarness {
    temp_dir: TempDir,
    pub ctx: RequestContext,
    pub engine: Arc<TagEngine>,
    pub notifier: Arc<RecordingSink>,
}

impl TestHarness {
    /// Harness acting as an editor holding every right.
    pub fn new() -> Self {
        Self::with_actions(Action::ALL.to_vec())
    }

    pub fn with_actions(actions: Vec<Action>) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("cdr.db")).expect("Failed to open database");
        let session = Session::new("test-session", "tester", actions);
        Self {
            temp_dir,
            ctx: RequestContext::new(db, session, Timeouts::default()),
            engine: Arc::new(TagEngine::default()),
            notifier: Arc::new(RecordingSink::default()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A directory under the temp root, created on demand.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }

    pub fn store(&self) -> DocumentStore {
        self.ctx.documents()
    }

    pub fn pipeline(&self) -> FilterPipeline {
        self.ctx
            .pipeline(self.engine.clone(), Arc::new(WellFormedValidator))
    }

    pub fn controller(&self) -> JobController {
        self.ctx.jobs(self.notifier.clone())
    }

    /// Controller acting as the background worker.
    pub fn worker_controller(&self) -> JobController {
        self.ctx.for_session(Session::system()).jobs(self.notifier.clone())
    }

    pub fn handlers(&self, output_root: Option<PathBuf>) -> HandlerRegistry {
        let system = self.ctx.for_session(Session::system());
        let publish = PublishHandler::new(
            system.documents(),
            system.pipeline(self.engine.clone(), Arc::new(WellFormedValidator)),
            system.ledger(),
            system.ledger_writer(),
        )
        .with_output_root(output_root);
        handlers::builtin(
            publish,
            GlobalChangeHandler::new(system.documents()),
            UnpublishedReportHandler::new(system.documents()),
        )
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Stores a filter document named `name`.
    pub fn add_filter(&self, name: &str, body: &str) -> DocId {
        self.store()
            .create_doc(NewDocument::new(FILTER_DOC_TYPE, body).with_title(name))
            .expect("Failed to create filter")
            .doc_id
    }

    pub fn add_doc(&self, doc_type: &str, xml: &str) -> DocId {
        self.store()
            .create_doc(NewDocument::new(doc_type, xml))
            .expect("Failed to create document")
            .doc_id
    }

    /// Saves `xml` as a new version, publishable or not.
    pub fn add_version(&self, id: DocId, xml: &str, publishable: bool) -> u32 {
        let store = self.store();
        let mut doc = store
            .get_doc(id, cdr::VersionSelector::Current)
            .expect("Failed to read document");
        doc.xml = xml.to_string();
        let opts = SaveOptions {
            publishable,
            ..SaveOptions::versioned("test save")
        };
        store
            .save_doc(&doc, &opts)
            .expect("Failed to save document")
            .version
            .expect("save created no version")
    }
}
