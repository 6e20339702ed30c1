//! Integration tests for the export pipeline.
//!
//! The document store is a `MockSender` with real create-if-absent semantics;
//! result directories are PyPerf outputs written into temp dirs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};

use result_export::ExportError;
use result_export::config::{HorreumConfig, OpenSearchConfig};
use result_export::core::{
    CanonicalDocument, Metadata, Metrics, OrderedMap, Results, Run, Scalar, TestInfo,
    TimeSeriesPoint, run_key, sequence_key,
};
use result_export::export::{CreateOutcome, SummaryExporter, TimeSeriesExportResult, TimeSeriesExporter};
use result_export::identity::{HashOptions, IdentifiedDocument};
use result_export::pipeline::{
    ExportTargets, OpenSearchTarget, Pipeline, ProcessingStats, RecordingReporter, Severity,
};
use result_export::storage::JsonDirWriter;
use result_export::transport::{Method, MockReply, MockSender, RetryPolicy, RetryingTransport};

const SUMMARY_INDEX: &str = "zathras-results";
const TIMESERIES_INDEX: &str = "zathras-timeseries";

fn pyperf_suite() -> Value {
    json!({
        "version": "1.0",
        "metadata": {
            "cpu_model_name": "Intel(R) Xeon(R) Gold 6348 CPU @ 2.60GHz",
            "cpu_count": 8,
            "perf_version": "2.6.1",
            "python_version": "3.12.1 (64-bit)"
        },
        "benchmarks": [
            {
                "metadata": {"name": "2to3", "loops": 1},
                "runs": [
                    {"metadata": {"date": "2025-09-18 22:10:00.123456", "mem_max_rss": 49152000},
                     "values": [0.25, 0.26, 0.27]},
                    {"metadata": {"date": "2025-09-18 22:10:05.000000", "mem_max_rss": 49160000},
                     "values": [0.255, 0.265]}
                ]
            },
            {
                "metadata": {"name": "nbody", "loops": 2},
                "runs": [
                    {"metadata": {"date": "2025-09-18 22:11:00.000000"},
                     "values": [0.11, 0.12, 0.13]}
                ]
            }
        ]
    })
}

/// `<root>/scenario/rhel/azure/Standard_D8ds_v6_1/results_pyperf/pyperf_out_*.json`
fn write_result_dir(root: &Path) -> PathBuf {
    let dir = root.join("scenario/rhel/azure/Standard_D8ds_v6_1");
    let extracted = dir.join("results_pyperf");
    std::fs::create_dir_all(&extracted).unwrap();
    std::fs::write(
        extracted.join("pyperf_out_20250918.json"),
        serde_json::to_string_pretty(&pyperf_suite()).unwrap(),
    )
    .unwrap();
    dir
}

/// Same layout as [`write_result_dir`] but holding only `results_pyperf.zip`.
fn write_zipped_result_dir(root: &Path) -> PathBuf {
    let dir = root.join("scenario/rhel/azure/Standard_D8ds_v6_1");
    std::fs::create_dir_all(&dir).unwrap();
    let file = std::fs::File::create(dir.join("results_pyperf.zip")).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file(
            "results_pyperf/pyperf_out_20250918.json",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
    std::io::Write::write_all(
        &mut writer,
        serde_json::to_string_pretty(&pyperf_suite()).unwrap().as_bytes(),
    )
    .unwrap();
    writer.finish().unwrap();
    dir
}

fn store_targets(mock: &Arc<MockSender>) -> ExportTargets {
    let cfg = OpenSearchConfig {
        retry_delay_secs: 0,
        ..Default::default()
    };
    let (summary, timeseries) = cfg.exporters_with(mock.clone()).expect("valid config");
    ExportTargets {
        opensearch: Some(OpenSearchTarget {
            summary,
            timeseries,
            batch_size: cfg.batch_size,
        }),
        ..Default::default()
    }
}

fn make_document(points: usize) -> CanonicalDocument {
    let mut run = Run::new(0, "PASS");
    let mut series = OrderedMap::new();
    for i in 0..points {
        let mut metrics = Metrics::new();
        metrics.insert("throughput_mbps".into(), Scalar::Float(900.0 + i as f64));
        series.insert(
            sequence_key(i),
            TimeSeriesPoint {
                timestamp: "2025-11-06T14:30:00Z".into(),
                metrics,
            },
        );
    }
    run.timeseries = Some(series);
    let mut runs = OrderedMap::new();
    runs.insert(run_key(0), run);

    CanonicalDocument {
        metadata: Metadata::new("2025-11-06T14:30:00Z"),
        test: TestInfo {
            name: "uperf".into(),
            version: None,
            description: None,
        },
        system_under_test: Default::default(),
        test_configuration: Default::default(),
        results: Results::from_runs("PASS", runs),
    }
}

#[test]
fn test_repeated_processing_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    write_result_dir(tmp.path());
    let mock = Arc::new(MockSender::new());
    let pipeline = Pipeline::with_reporter(store_targets(&mock), RecordingReporter::new());

    let runs: Vec<ProcessingStats> = (0..3)
        .map(|_| pipeline.process_all(tmp.path()).expect("process"))
        .collect();

    assert_eq!(runs[0].documents_created, 1);
    assert_eq!(runs[0].timeseries_indexed, 8);
    for later in &runs[1..] {
        assert_eq!(later.documents_created, 0);
        assert_eq!(later.documents_duplicates, 1);
        assert_eq!(later.timeseries_indexed, 0);
        assert_eq!(later.timeseries_skipped, 8);
        assert_eq!(later.exit_code(), 0, "duplicates are successes");
    }

    assert_eq!(mock.document_count(SUMMARY_INDEX), 1);
    assert_eq!(mock.document_count(TIMESERIES_INDEX), 8);
    assert_eq!(mock.count_requests(Method::Post, "/_bulk"), 1);
    assert_eq!(mock.count_requests(Method::Put, "/zathras-results/_create/"), 3);
    assert!(
        pipeline
            .reporter()
            .contains(Severity::Warn, "Duplicate detected, skipped: pyperf_")
    );
}

#[test]
fn test_stored_summary_has_no_raw_series() {
    let tmp = tempfile::tempdir().unwrap();
    write_result_dir(tmp.path());
    let mock = Arc::new(MockSender::new());
    Pipeline::with_reporter(store_targets(&mock), RecordingReporter::new())
        .process_all(tmp.path())
        .unwrap();

    let stored = mock.documents(SUMMARY_INDEX).pop().expect("one summary");
    let id = stored["metadata"]["document_id"].as_str().unwrap().to_string();
    assert!(id.starts_with("pyperf_"));
    assert_eq!(stored["metadata"]["instance_type"], "Standard_D8ds_v6");
    assert_eq!(stored["metadata"]["cloud_provider"], "azure");
    assert_eq!(stored["_export_metadata"]["exporter"], result_export::EXPORTER_NAME);

    let run0 = &stored["results"]["runs"]["run_0"];
    assert!(run0.get("timeseries").is_none());
    assert_eq!(run0["timeseries_summary"]["count"], 5);

    let points = mock.documents(TIMESERIES_INDEX);
    assert!(points.iter().all(|p| p["document_id"] == id.as_str()));
    assert!(points.iter().any(|p| p["metrics"]["mem_max_rss_bytes"] == 49160000));
}

#[test]
fn test_reprocessing_yields_same_id_and_new_timestamp() {
    let tmp = tempfile::tempdir().unwrap();
    write_result_dir(tmp.path());
    let out_a = tmp.path().join("json_a");
    let out_b = tmp.path().join("json_b");
    let mock = Arc::new(MockSender::new());

    let run = |out: &Path| {
        let mut targets = store_targets(&mock);
        targets.json_output = Some(JsonDirWriter::new(out));
        Pipeline::with_reporter(targets, RecordingReporter::new())
            .process_all(&tmp.path().join("scenario"))
            .unwrap()
    };
    let first = run(&out_a);
    std::thread::sleep(std::time::Duration::from_millis(10));
    let second = run(&out_b);

    let ids_a = JsonDirWriter::new(&out_a).list_ids().unwrap();
    let ids_b = JsonDirWriter::new(&out_b).list_ids().unwrap();
    assert_eq!(ids_a.len(), 1);
    assert_eq!(ids_a, ids_b);

    let doc_a = std::fs::read_to_string(out_a.join(format!("{}.json", ids_a[0]))).unwrap();
    let doc_b = std::fs::read_to_string(out_b.join(format!("{}.json", ids_b[0]))).unwrap();
    let doc_a: CanonicalDocument = serde_json::from_str(&doc_a).unwrap();
    let doc_b: CanonicalDocument = serde_json::from_str(&doc_b).unwrap();
    assert_ne!(
        doc_a.metadata.processing_timestamp,
        doc_b.metadata.processing_timestamp
    );

    assert_eq!(first.documents_created, 1);
    assert_eq!(second.documents_duplicates, 1);
}

#[test]
fn test_timeseries_exported_once_across_submissions() {
    let mock = Arc::new(MockSender::new());
    let pipeline = Pipeline::with_reporter(store_targets(&mock), RecordingReporter::new());
    let mut stats = ProcessingStats::new();

    let outcomes: Vec<_> = (0..5)
        .map(|_| pipeline.export_document(make_document(1000), &mut stats).unwrap())
        .collect();

    assert_eq!(outcomes[0].summary, Some(CreateOutcome::Created));
    assert!(outcomes[1..].iter().all(|o| o.summary == Some(CreateOutcome::Duplicate)));
    assert!(outcomes.iter().all(|o| o.document_id == outcomes[0].document_id));
    assert_eq!(
        outcomes[0].timeseries,
        Some(TimeSeriesExportResult { total: 1000, successful: 1000, failed: 0 })
    );
    assert_eq!(stats.documents_created, 1);
    assert_eq!(stats.documents_duplicates, 4);
    assert_eq!(stats.timeseries_skipped, 4000);
    assert_eq!(mock.document_count(TIMESERIES_INDEX), 1000);
    assert_eq!(mock.count_requests(Method::Post, "/_bulk"), 2);
}

#[test]
fn test_bulk_item_failure_is_counted() {
    let mock = Arc::new(MockSender::new());
    mock.fail_bulk_items([6]);
    let transport = RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3));
    let exporter = TimeSeriesExporter::new(transport, TIMESERIES_INDEX);
    let doc = IdentifiedDocument::resolve(make_document(10), HashOptions::default()).unwrap();

    let result = exporter.export_timeseries(&doc, 500).unwrap();

    assert_eq!(result, TimeSeriesExportResult { total: 10, successful: 9, failed: 1 });
    assert_eq!(mock.count_requests(Method::Post, "/_bulk"), 1, "partial failure is not retried");
    assert_eq!(mock.document_count(TIMESERIES_INDEX), 9);
}

#[test]
fn test_retry_exhaustion_on_server_error() {
    let mock = Arc::new(MockSender::new());
    mock.always(MockReply::status(503, r#"{"error":"unavailable"}"#));
    let exporter = SummaryExporter::new(
        RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3)),
        SUMMARY_INDEX,
    );
    let doc = IdentifiedDocument::resolve(make_document(1), HashOptions::default()).unwrap();

    let err = exporter.export_summary(&doc).unwrap_err();
    assert!(matches!(err, ExportError::TransientTransport { attempts: 3, .. }));
    assert_eq!(mock.request_count(), 3);
}

#[test]
fn test_client_errors_are_not_retried() {
    for status in [400, 404] {
        let mock = Arc::new(MockSender::new());
        mock.always(MockReply::status(status, "{}"));
        let exporter = SummaryExporter::new(
            RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3)),
            SUMMARY_INDEX,
        );
        let doc = IdentifiedDocument::resolve(make_document(1), HashOptions::default()).unwrap();

        let err = exporter.export_summary(&doc).unwrap_err();
        assert_eq!(err.client_status(), Some(status));
        assert_eq!(mock.request_count(), 1);
    }
}

#[test]
fn test_connection_refused_is_retried() {
    let mock = Arc::new(MockSender::new());
    mock.push_reply(MockReply::ConnectionRefused);
    let exporter = SummaryExporter::new(
        RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3)),
        SUMMARY_INDEX,
    );
    let doc = IdentifiedDocument::resolve(make_document(1), HashOptions::default()).unwrap();

    assert_eq!(exporter.export_summary(&doc).unwrap(), CreateOutcome::Created);
    assert_eq!(mock.request_count(), 2);
}

#[test]
fn test_run_sink_receives_every_submission() {
    let tmp = tempfile::tempdir().unwrap();
    write_result_dir(tmp.path());
    let store = Arc::new(MockSender::new());
    let horreum = Arc::new(MockSender::new());

    let mut targets = store_targets(&store);
    targets.run_sink = Some(Box::new(
        HorreumConfig::default().exporter_with(horreum.clone()).unwrap(),
    ));
    let pipeline = Pipeline::with_reporter(targets, RecordingReporter::new());
    pipeline.process_all(tmp.path()).unwrap();
    pipeline.process_all(tmp.path()).unwrap();

    assert_eq!(store.document_count(SUMMARY_INDEX), 1);
    let runs = horreum.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].1["metadata"]["document_id"], runs[1].1["metadata"]["document_id"]);
}

#[test]
fn test_run_sink_failure_does_not_fail_document() {
    let tmp = tempfile::tempdir().unwrap();
    write_result_dir(tmp.path());
    let horreum = Arc::new(MockSender::new());
    horreum.always(MockReply::status(401, "unauthorized"));

    let targets = ExportTargets {
        run_sink: Some(Box::new(
            HorreumConfig::default().exporter_with(horreum.clone()).unwrap(),
        )),
        ..Default::default()
    };
    let pipeline = Pipeline::with_reporter(targets, RecordingReporter::new());
    let stats = pipeline.process_all(tmp.path()).unwrap();

    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 0);
    assert!(pipeline.reporter().contains(Severity::Error, "horreum export failed"));
}

#[test]
fn test_zipped_results_match_extracted_results() {
    let zipped = tempfile::tempdir().unwrap();
    write_zipped_result_dir(zipped.path());
    let extracted = tempfile::tempdir().unwrap();
    write_result_dir(extracted.path());

    let mock = Arc::new(MockSender::new());
    let pipeline = Pipeline::with_reporter(store_targets(&mock), RecordingReporter::new());
    let first = pipeline.process_all(zipped.path()).unwrap();
    let second = pipeline.process_all(extracted.path()).unwrap();

    assert_eq!(first.successful, 1);
    assert_eq!(first.documents_created, 1);
    assert_eq!(first.timeseries_indexed, 8);
    // same content and layout, so the extracted copy is a duplicate
    assert_eq!(second.documents_duplicates, 1);
    assert_eq!(mock.document_count(SUMMARY_INDEX), 1);
}

#[test]
fn test_nothing_to_process_is_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::with_reporter(ExportTargets::default(), RecordingReporter::new());
    let stats = pipeline.process_all(tmp.path()).unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.exit_code(), 1);
}
