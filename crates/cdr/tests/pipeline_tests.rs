//! Filter pipeline composition against stored filters.

mod common;

use common::{summary_xml, FilterSetBuilder, TestHarness};

use cdr::forms::{parse_form, FilterRequest};
use cdr::pipeline::{FilterParams, DOC_ID_PLACEHOLDER};
use cdr::{CdrError, FilterRef, VersionSelector};

fn qc_set(h: &TestHarness) -> (i64, i64) {
    let strip = h.add_filter("Strip Comments", "<xsl:stylesheet/>");
    let report = h.add_filter("QC Summary Report", "<xsl:stylesheet/>");
    h.ctx
        .filters()
        .put_filter_set(&FilterSetBuilder::new("QC Summary Set").filter(strip).filter(report).build())
        .unwrap();
    (strip, report)
}

#[test]
fn test_lastp_without_publishable_version_runs_nothing() {
    let h = TestHarness::new();
    qc_set(&h);
    let id = h.add_doc("Summary", &summary_xml("Draft only", &[]));

    let err = h
        .pipeline()
        .filter_doc(
            id,
            VersionSelector::LastPublishable,
            &[FilterRef::SetName("QC Summary Set".into())],
            &FilterParams::new(),
        )
        .unwrap_err();
    assert!(matches!(err, CdrError::NoPublishableVersion(_)), "got {:?}", err);
    assert_eq!(h.engine.calls(), 0);
}

#[test]
fn test_filters_apply_in_order_with_shared_params() {
    let h = TestHarness::new();
    let (strip, report) = qc_set(&h);
    let extra = h.add_filter("Add Glossary", "<xsl:stylesheet/>");
    let id = h.add_doc("Summary", &summary_xml("Ordered", &[]));
    h.add_version(id, &summary_xml("Ordered", &[]), true);

    let mut params = FilterParams::new();
    params.insert("isPP".into(), "Y".into());
    let result = h
        .pipeline()
        .filter_doc(
            id,
            VersionSelector::LastPublishable,
            &[FilterRef::SetName("QC Summary Set".into()), FilterRef::Name("add glossary".into())],
            &params,
        )
        .unwrap();

    assert_eq!(result.filters, vec![strip, report, extra]);
    assert_eq!(h.engine.applied(), vec![strip, report, extra]);
    assert!(result
        .body
        .ends_with("<!--Strip Comments--><!--QC Summary Report--><!--Add Glossary-->"));
    assert_eq!(
        result.warnings,
        vec![
            "Strip Comments [isPP=Y]".to_string(),
            "QC Summary Report [isPP=Y]".to_string(),
            "Add Glossary [isPP=Y]".to_string(),
        ]
    );
}

#[test]
fn test_same_inputs_same_output() {
    let h = TestHarness::new();
    qc_set(&h);
    let id = h.add_doc("Summary", &summary_xml("Deterministic", &[]));
    let refs = [FilterRef::SetName("QC Summary Set".into())];
    let mut params = FilterParams::new();
    params.insert("DisplayComments".into(), "A".into());

    let pipeline = h.pipeline();
    let first = pipeline.filter_doc(id, VersionSelector::Current, &refs, &params).unwrap();
    let second = pipeline.filter_doc(id, VersionSelector::Current, &refs, &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_engine_failure_names_the_stage() {
    let h = TestHarness::new();
    let good = h.add_filter("Good", "<xsl:stylesheet/>");
    let bad = h.add_filter("Broken", "FAIL");
    let id = h.add_doc("Summary", &summary_xml("Failing", &[]));

    let err = h
        .pipeline()
        .filter_doc(
            id,
            VersionSelector::Current,
            &[FilterRef::Id(good), FilterRef::Id(bad), FilterRef::Id(good)],
            &FilterParams::new(),
        )
        .unwrap_err();
    match err {
        CdrError::FilterExecution { filter_id, message } => {
            assert_eq!(filter_id, cdr::canonical(bad));
            assert!(message.contains("Broken"));
        }
        other => panic!("expected FilterExecution, got {:?}", other),
    }
    assert_eq!(h.engine.calls(), 2);
}

#[test]
fn test_unknown_reference_fails_before_reading() {
    let h = TestHarness::new();
    let id = h.add_doc("Summary", &summary_xml("Unknown", &[]));
    let err = h
        .pipeline()
        .filter_doc(
            id,
            VersionSelector::Current,
            &[FilterRef::Name("No Such Filter".into())],
            &FilterParams::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "UnknownFilter");
    assert_eq!(h.engine.calls(), 0);
}

#[test]
fn test_validate_doc_reports_schema_errors() {
    let h = TestHarness::new();
    let f = h.add_filter("Copy", "<xsl:stylesheet/>");
    let id = h.add_doc("Summary", &summary_xml("Validated", &[]));
    let pipeline = h.pipeline();

    let ok = pipeline
        .validate_doc(id, VersionSelector::Current, &[FilterRef::Id(f)], "Summary.xml", &FilterParams::new())
        .unwrap();
    assert!(ok.is_valid());
    assert_eq!(ok.result.warnings.len(), 1);

    let wrong = pipeline
        .validate_doc(id, VersionSelector::Current, &[FilterRef::Id(f)], "Term.xml", &FilterParams::new())
        .unwrap();
    assert!(!wrong.is_valid());
}

#[test]
fn test_form_request_drives_the_pipeline() {
    let h = TestHarness::new();
    let (strip, report) = qc_set(&h);
    let id = h.add_doc("Summary", &summary_xml("From form", &[]));

    let pairs: Vec<(String, String)> = [
        ("Session", "guest"),
        ("DocId", cdr::canonical(id).as_str()),
        ("DocVer", "0"),
        ("filter", "set:QC Summary Set"),
        ("isqc", "true"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let request: FilterRequest = parse_form(&pairs).unwrap();
    let params = request.qc_options().to_params();

    let result = h
        .pipeline()
        .filter_doc(request.doc_id, request.version, &request.filters, &params)
        .unwrap()
        .with_doc_id(&cdr::canonical(id));
    assert_eq!(result.filters, vec![strip, report]);
    assert!(result.warnings[0].contains("isQC=Y"));
    assert!(!result.body.contains(DOC_ID_PLACEHOLDER));
}
