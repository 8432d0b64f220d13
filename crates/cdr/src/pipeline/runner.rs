use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use super::engine::{FilterEngine, FilterParams, FilterScript};
use crate::docs::{DocumentStore, SchemaValidator};
use crate::error::{Result, ValidationMessage};
use crate::filters::FilterRegistry;
use crate::ids::{canonical, DocId, FilterRef, VersionSelector};

/// Placeholder some filters emit where the document id belongs.
pub const DOC_ID_PLACEHOLDER: &str = "@@DOCID@@";

/// Output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub body: String,
    /// Messages from every stage, in stage order.
    pub warnings: Vec<String>,
    /// The concrete filters applied, in order.
    pub filters: Vec<DocId>,
}

impl FilterResult {
    /// Replaces the document id placeholder with `cdr_id`.
    pub fn with_doc_id(mut self, cdr_id: &str) -> Self {
        self.body = self.body.replace(DOC_ID_PLACEHOLDER, cdr_id);
        self
    }
}

/// Filtered output checked against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub result: FilterResult,
    pub errors: Vec<ValidationMessage>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        !self.errors.iter().any(ValidationMessage::is_error)
    }
}

/// Composes filters over stored documents.
#[derive(Clone)]
pub struct FilterPipeline {
    store: DocumentStore,
    registry: FilterRegistry,
    engine: Arc<dyn FilterEngine>,
    validator: Arc<dyn SchemaValidator>,
    filter_version: VersionSelector,
}

struct LoadedFilter {
    name: String,
    body: String,
}

impl FilterPipeline {
    pub fn new(
        store: DocumentStore,
        registry: FilterRegistry,
        engine: Arc<dyn FilterEngine>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            validator,
            filter_version: VersionSelector::Current,
        }
    }

    /// Version of each filter body to run; the working copy by default.
    pub fn with_filter_version(mut self, selector: VersionSelector) -> Self {
        self.filter_version = selector;
        self
    }

    /// Filters a stored document. The document is read before any filter
    /// runs, so an unsatisfiable selector fails without engine calls.
    pub fn filter_doc(
        &self,
        doc_id: DocId,
        selector: VersionSelector,
        refs: &[FilterRef],
        params: &FilterParams,
    ) -> Result<FilterResult> {
        let _span = info_span!("filter_doc", doc = %canonical(doc_id), version = %selector).entered();
        let filters = self.registry.resolve_refs(refs)?;
        let doc = self.store.get_doc(doc_id, selector)?;
        self.run(&doc.xml, filters, params)
    }

    /// Filters a body that is not (or not yet) stored.
    pub fn filter_xml(&self, xml: &str, refs: &[FilterRef], params: &FilterParams) -> Result<FilterResult> {
        let _span = info_span!("filter_xml", bytes = xml.len()).entered();
        let filters = self.registry.resolve_refs(refs)?;
        self.run(xml, filters, params)
    }

    /// Filters, then validates the result against `schema`.
    pub fn validate_doc(
        &self,
        doc_id: DocId,
        selector: VersionSelector,
        refs: &[FilterRef],
        schema: &str,
        params: &FilterParams,
    ) -> Result<ValidationResult> {
        let result = self.filter_doc(doc_id, selector, refs, params)?;
        let errors = self.validator.validate(schema, &result.body);
        debug!(doc = %canonical(doc_id), schema, messages = errors.len(), "validated filter output");
        Ok(ValidationResult { result, errors })
    }

    fn load_filters(&self, ids: &[DocId]) -> Result<HashMap<DocId, LoadedFilter>> {
        let mut loaded = HashMap::new();
        for id in ids {
            if loaded.contains_key(id) {
                continue;
            }
            let doc = self.store.get_doc(*id, self.filter_version)?;
            loaded.insert(
                *id,
                LoadedFilter {
                    name: doc.title,
                    body: doc.xml,
                },
            );
        }
        Ok(loaded)
    }

    fn run(&self, input: &str, filters: Vec<DocId>, params: &FilterParams) -> Result<FilterResult> {
        let loaded = self.load_filters(&filters)?;
        let mut body = input.to_string();
        let mut warnings = Vec::new();
        for (stage, id) in filters.iter().enumerate() {
            let Some(filter) = loaded.get(id) else {
                continue;
            };
            let _stage = info_span!("filter_stage", stage, filter = %canonical(*id)).entered();
            let script = FilterScript {
                id: *id,
                name: &filter.name,
                body: &filter.body,
            };
            let output = self
                .engine
                .apply(&script, &body, params)
                .map_err(|e| e.at_stage(*id))?;
            debug!(messages = output.messages.len(), bytes = output.body.len(), "stage complete");
            warnings.extend(output.messages);
            body = output.body;
        }
        Ok(FilterResult {
            body,
            warnings,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::db::Database;
    use crate::docs::{NewDocument, SaveOptions, WellFormedValidator, FILTER_DOC_TYPE};
    use crate::filters::FilterSetSpec;
    use crate::pipeline::{EngineError, EngineOutput};
    use crate::session::{Action, Session};

    /// Wraps the input in an element named by the filter body and reports
    /// the parameters it saw.
    #[derive(Default)]
    struct WrapEngine {
        calls: AtomicUsize,
        seen: Mutex<Vec<FilterParams>>,
    }

    impl FilterEngine for WrapEngine {
        fn apply(
            &self,
            filter: &FilterScript<'_>,
            input: &str,
            params: &FilterParams,
        ) -> std::result::Result<EngineOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(params.clone());
            if filter.body == "fail" {
                return Err(EngineError::Failed("stylesheet error".into()));
            }
            Ok(EngineOutput {
                body: format!("<{0}>{1}</{0}>", filter.body, input),
                messages: vec![format!("{} ran", filter.name)],
            })
        }
    }

    struct Fixture {
        store: DocumentStore,
        registry: FilterRegistry,
        engine: Arc<WrapEngine>,
        pipeline: FilterPipeline,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let session = Session::new("s", "qc", Action::ALL);
        let store = DocumentStore::new(db.clone(), session.clone());
        let registry = FilterRegistry::new(db, session);
        let engine = Arc::new(WrapEngine::default());
        let pipeline = FilterPipeline::new(
            store.clone(),
            registry.clone(),
            engine.clone(),
            Arc::new(WellFormedValidator),
        );
        Fixture {
            store,
            registry,
            engine,
            pipeline,
        }
    }

    fn add_filter(store: &DocumentStore, name: &str, body: &str) -> DocId {
        store
            .create_doc(NewDocument::new(FILTER_DOC_TYPE, body).with_title(name))
            .unwrap()
            .doc_id
    }

    #[test]
    fn test_stages_run_in_order_with_same_params() {
        let fx = fixture();
        add_filter(&fx.store, "First", "a");
        add_filter(&fx.store, "Second", "b");
        let doc = fx.store.create_doc(NewDocument::new("Summary", "x")).unwrap().doc_id;
        let mut params = FilterParams::new();
        params.insert("isQC".into(), "Y".into());

        let refs = [FilterRef::Name("First".into()), FilterRef::Name("Second".into())];
        let out = fx
            .pipeline
            .filter_doc(doc, VersionSelector::Current, &refs, &params)
            .unwrap();
        assert_eq!(out.body, "<b><a>x</a></b>");
        assert_eq!(out.warnings, vec!["First ran", "Second ran"]);
        let seen = fx.engine.seen.lock().unwrap();
        assert!(seen.iter().all(|p| p == &params));
    }

    #[test]
    fn test_deterministic_output() {
        let fx = fixture();
        add_filter(&fx.store, "First", "a");
        fx.registry
            .put_filter_set(&FilterSetSpec::new("Twice", "same filter twice", vec![
                FilterRef::Name("First".into()),
                FilterRef::Name("First".into()),
            ]))
            .unwrap();
        let refs = [FilterRef::SetName("Twice".into())];
        let one = fx.pipeline.filter_xml("<d/>", &refs, &FilterParams::new()).unwrap();
        let two = fx.pipeline.filter_xml("<d/>", &refs, &FilterParams::new()).unwrap();
        assert_eq!(one, two);
        assert_eq!(one.body, "<a><a><d/></a></a>");
    }

    #[test]
    fn test_no_publishable_version_runs_nothing() {
        let fx = fixture();
        add_filter(&fx.store, "First", "a");
        let doc = fx.store.create_doc(NewDocument::new("Summary", "x")).unwrap().doc_id;
        let err = fx
            .pipeline
            .filter_doc(doc, VersionSelector::LastPublishable, &[FilterRef::Name("First".into())], &FilterParams::new())
            .unwrap_err();
        assert_eq!(err.kind(), "NoPublishableVersion");
        assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_failure_names_stage() {
        let fx = fixture();
        add_filter(&fx.store, "Good", "a");
        let bad = add_filter(&fx.store, "Bad", "fail");
        let refs = [FilterRef::Name("Good".into()), FilterRef::Id(bad)];
        let err = fx.pipeline.filter_xml("<d/>", &refs, &FilterParams::new()).unwrap_err();
        match err {
            crate::error::CdrError::FilterExecution { filter_id, message } => {
                assert_eq!(filter_id, canonical(bad));
                assert_eq!(message, "stylesheet error");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_filter() {
        let fx = fixture();
        let err = fx
            .pipeline
            .filter_xml("<d/>", &[FilterRef::Name("Missing".into())], &FilterParams::new())
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownFilter");
    }

    #[test]
    fn test_filter_version_selector() {
        let fx = fixture();
        let id = add_filter(&fx.store, "Versioned", "v1");
        let mut doc = fx.store.get_doc(id, VersionSelector::Current).unwrap();
        doc.xml = "v2".into();
        fx.store.save_doc(&doc, &SaveOptions::default()).unwrap();

        let refs = [FilterRef::Id(id)];
        let cwd = fx.pipeline.filter_xml("x", &refs, &FilterParams::new()).unwrap();
        assert_eq!(cwd.body, "<v2>x</v2>");
        let last = fx
            .pipeline
            .clone()
            .with_filter_version(VersionSelector::Last)
            .filter_xml("x", &refs, &FilterParams::new())
            .unwrap();
        assert_eq!(last.body, "<v1>x</v1>");
    }

    #[test]
    fn test_with_doc_id_and_validation() {
        let fx = fixture();
        add_filter(&fx.store, "Wrap", "Summary");
        let doc = fx
            .store
            .create_doc(NewDocument::new("Summary", "<Id>@@DOCID@@</Id>"))
            .unwrap()
            .doc_id;
        let refs = [FilterRef::Name("Wrap".into())];
        let out = fx
            .pipeline
            .filter_doc(doc, VersionSelector::Current, &refs, &FilterParams::new())
            .unwrap()
            .with_doc_id(&canonical(doc));
        assert_eq!(out.body, format!("<Summary><Id>{}</Id></Summary>", canonical(doc)));

        let checked = fx
            .pipeline
            .validate_doc(doc, VersionSelector::Current, &refs, "Summary.xml", &FilterParams::new())
            .unwrap();
        assert!(checked.is_valid());
        let wrong = fx
            .pipeline
            .validate_doc(doc, VersionSelector::Current, &refs, "Media.xml", &FilterParams::new())
            .unwrap();
        assert!(!wrong.is_valid());
        assert_eq!(wrong.result.warnings, vec!["Wrap ran"]);
    }
}
