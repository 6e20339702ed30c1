//! Drives result directories through adapters, identity resolution and the
//! export targets.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::adapters::{
    AdapterRegistry, ArchiveKind, BUILTIN_ADAPTERS, detect_test_type, list_archives, lookup,
};
use crate::core::CanonicalDocument;
use crate::export::{CreateOutcome, RunSink, SummaryExporter, TimeSeriesExportResult, TimeSeriesExporter};
use crate::identity::{DocumentId, HashOptions, IdentifiedDocument};
use crate::storage::JsonDirWriter;
use crate::{ExportError, ExportResult};

use super::reporter::{Reporter, TracingReporter};
use super::stats::ProcessingStats;

/// The two-index document store.
#[derive(Clone)]
pub struct OpenSearchTarget {
    pub summary: SummaryExporter,
    pub timeseries: TimeSeriesExporter,
    pub batch_size: usize,
}

/// Where processed documents go. Every target is optional.
#[derive(Default)]
pub struct ExportTargets {
    pub opensearch: Option<OpenSearchTarget>,
    pub run_sink: Option<Box<dyn RunSink>>,
    pub json_output: Option<JsonDirWriter>,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub document_id: DocumentId,
    pub json_path: Option<PathBuf>,
    /// `None` when the store is disabled
    pub summary: Option<CreateOutcome>,
    /// `None` unless the summary was created and there were points to send
    pub timeseries: Option<TimeSeriesExportResult>,
    pub remote_run_id: Option<String>,
}

pub struct Pipeline<R: Reporter = TracingReporter> {
    targets: ExportTargets,
    registry: &'static AdapterRegistry,
    hash_options: HashOptions,
    reporter: R,
}

impl Pipeline<TracingReporter> {
    pub fn new(targets: ExportTargets) -> Self {
        Pipeline::with_reporter(targets, TracingReporter)
    }
}

impl<R: Reporter> Pipeline<R> {
    pub fn with_reporter(targets: ExportTargets, reporter: R) -> Self {
        Pipeline {
            targets,
            registry: BUILTIN_ADAPTERS,
            hash_options: HashOptions::default(),
            reporter,
        }
    }

    pub fn with_registry(mut self, registry: &'static AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_hash_options(mut self, options: HashOptions) -> Self {
        self.hash_options = options;
        self
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Probe the store and make sure both indices exist.
    ///
    /// Problems are reported but not fatal; per-document exports will surface
    /// them as failures.
    pub fn prepare(&self) {
        let Some(store) = &self.targets.opensearch else {
            return;
        };
        if !store.summary.test_connection() {
            self.reporter.warn("Document store did not answer the connection probe");
        }
        if let Err(e) = store.summary.ensure_index() {
            self.reporter
                .warn(&format!("Could not ensure index {}: {e}", store.summary.index()));
        }
        if let Err(e) = store.timeseries.ensure_index() {
            self.reporter
                .warn(&format!("Could not ensure index {}: {e}", store.timeseries.index()));
        }
    }

    /// Resolve identity for `document` and send it to every enabled target.
    ///
    /// The time series goes out only when the summary was newly created. A
    /// failing run sink is reported but does not fail the document.
    pub fn export_document(
        &self,
        document: CanonicalDocument,
        stats: &mut ProcessingStats,
    ) -> ExportResult<DocumentOutcome> {
        let doc = IdentifiedDocument::resolve(document, self.hash_options)?;
        self.reporter
            .info(&format!("Parsed {}: {}", doc.test_name(), doc.id()));

        let mut outcome = DocumentOutcome {
            document_id: doc.id().clone(),
            json_path: None,
            summary: None,
            timeseries: None,
            remote_run_id: None,
        };

        if let Some(writer) = &self.targets.json_output {
            let path = writer.write(&doc)?;
            self.reporter.info(&format!("Wrote JSON: {}", path.display()));
            outcome.json_path = Some(path);
        }

        if let Some(store) = &self.targets.opensearch {
            let points = doc.document().timeseries_point_count();
            let created = store.summary.export_summary(&doc)?;
            match created {
                CreateOutcome::Created => {
                    stats.record_document_created();
                    self.reporter
                        .info(&format!("Created summary document: {}", doc.id()));
                    if points > 0 {
                        let ts = store.timeseries.export_timeseries(&doc, store.batch_size)?;
                        stats.record_timeseries_indexed(ts.successful);
                        stats.record_timeseries_failed(ts.failed);
                        self.reporter.info(&format!(
                            "Exported time series: {}/{} points",
                            ts.successful, ts.total
                        ));
                        if ts.failed > 0 {
                            self.reporter
                                .warn(&format!("Failed: {} time series points", ts.failed));
                        }
                        outcome.timeseries = Some(ts);
                    }
                }
                CreateOutcome::Duplicate => {
                    stats.record_duplicate();
                    stats.record_timeseries_skipped(points);
                    self.reporter
                        .warn(&format!("Duplicate detected, skipped: {}", doc.id()));
                }
            }
            outcome.summary = Some(created);
        }

        if let Some(sink) = &self.targets.run_sink {
            match sink.export(&doc) {
                Ok(run_id) => {
                    self.reporter
                        .info(&format!("Exported to {}: run {run_id}", sink.name()));
                    outcome.remote_run_id = Some(run_id);
                }
                Err(e) => self
                    .reporter
                    .error(&format!("{} export failed: {e}", sink.name())),
            }
        }

        Ok(outcome)
    }

    /// Process every archive in one result directory.
    pub fn process_result_directory(&self, result_dir: &Path, stats: &mut ProcessingStats) {
        let archives = match list_archives(result_dir) {
            Ok(archives) => archives,
            Err(e) => {
                self.reporter
                    .error(&format!("Cannot list {}: {e}", result_dir.display()));
                stats.record_failure(&result_dir.display().to_string(), e.to_string());
                return;
            }
        };
        if archives.is_empty() {
            self.reporter
                .warn(&format!("No result archives found in {}", result_dir.display()));
            return;
        }
        self.reporter.info(&format!(
            "Found {} result archive(s) in {}",
            archives.len(),
            result_dir.display()
        ));

        for (n, archive) in archives.iter().enumerate() {
            stats.total += 1;
            let Some(adapter) = lookup(self.registry, &archive.tag) else {
                self.reporter
                    .warn(&format!("Unknown test type: {}", archive.tag));
                stats.record_skip(&archive.name(), "Unknown test type");
                continue;
            };
            let test_name = adapter.test_name().to_string();
            self.reporter.info(&format!(
                "[{}/{}] Processing {test_name}: {}",
                n + 1,
                archives.len(),
                archive.name()
            ));

            let result = adapter
                .parse(result_dir, archive)
                .and_then(|document| self.export_document(document, stats));
            match result {
                Ok(_) => stats.record_success(&test_name),
                Err(e) => {
                    self.reporter
                        .error(&format!("Failed to process {test_name}: {e}"));
                    stats.record_failure(&test_name, e.to_string());
                }
            }
        }
    }

    /// Discover result directories below `input` and process them all.
    pub fn process_all(&self, input: &Path) -> ExportResult<ProcessingStats> {
        let dirs = discover_result_directories(input)?;
        let mut stats = ProcessingStats::new();
        if dirs.is_empty() {
            self.reporter
                .warn(&format!("No result directories found under {}", input.display()));
            return Ok(stats);
        }
        for dir in &dirs {
            self.reporter
                .info(&format!("Found results in: {}", dir.display()));
        }

        self.prepare();
        for dir in &dirs {
            self.process_result_directory(dir, &mut stats);
        }
        Ok(stats)
    }
}

/// Directories holding result archives: `input` itself if it has any,
/// otherwise every such directory below it, sorted.
pub fn discover_result_directories(input: &Path) -> ExportResult<Vec<PathBuf>> {
    if !input.is_dir() {
        return Err(ExportError::Message(format!(
            "input path is not a directory: {}",
            input.display()
        )));
    }
    if !list_archives(input)?.is_empty() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut walker = WalkDir::new(input).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(archive) = detect_test_type(entry.path()) else {
            continue;
        };
        if archive.kind == ArchiveKind::Directory {
            // extracted contents are not result directories themselves
            walker.skip_current_dir();
        }
        if let Some(parent) = entry.path().parent() {
            if !dirs.iter().any(|d| d == parent) {
                dirs.push(parent.to_path_buf());
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::adapters::{FormatAdapter, ResultArchive};
    use crate::core::{
        Metadata, Metrics, OrderedMap, Results, Run, Scalar, TestInfo, TimeSeriesPoint, run_key,
    };
    use crate::pipeline::reporter::{RecordingReporter, Severity};
    use crate::transport::{MockReply, MockSender, RetryPolicy, RetryingTransport};

    /// Reads `score.txt` from the extracted archive.
    struct ScoreAdapter;

    impl FormatAdapter for ScoreAdapter {
        fn test_name(&self) -> &str {
            "coremark"
        }

        fn parse(&self, _result_dir: &Path, archive: &ResultArchive) -> ExportResult<CanonicalDocument> {
            let raw = fs::read_to_string(archive.path.join("score.txt"))?;
            let score: f64 = raw
                .trim()
                .parse()
                .map_err(|e| ExportError::Format(format!("bad score: {e}")))?;
            let mut run = Run::new(0, "PASS");
            let mut metrics = Metrics::new();
            metrics.insert("iterations_per_second".into(), Scalar::Float(score));
            run.metrics = metrics;
            let mut runs = OrderedMap::new();
            runs.insert(run_key(0), run);
            Ok(CanonicalDocument {
                metadata: Metadata::new("2025-11-06T14:30:00Z"),
                test: TestInfo {
                    name: "coremark".into(),
                    version: None,
                    description: None,
                },
                system_under_test: Default::default(),
                test_configuration: Default::default(),
                results: Results::from_runs("PASS", runs),
            })
        }
    }

    fn score_adapter() -> Box<dyn FormatAdapter> {
        Box::new(ScoreAdapter)
    }

    static TEST_ADAPTERS: &AdapterRegistry = &[("coremark", score_adapter)];

    fn result_dir(root: &Path, name: &str, score: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("results_coremark")).unwrap();
        fs::write(dir.join("results_coremark").join("score.txt"), score).unwrap();
        dir
    }

    fn targets(mock: &Arc<MockSender>) -> ExportTargets {
        let transport = RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3));
        ExportTargets {
            opensearch: Some(OpenSearchTarget {
                summary: SummaryExporter::new(transport.clone(), "summary"),
                timeseries: TimeSeriesExporter::new(transport, "timeseries"),
                batch_size: 500,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_discover_input_itself() {
        let tmp = TempDir::new().unwrap();
        let dir = result_dir(tmp.path(), "host_0", "100");
        assert_eq!(discover_result_directories(&dir).unwrap(), vec![dir.clone()]);
    }

    #[test]
    fn test_discover_nested_sorted() {
        let tmp = TempDir::new().unwrap();
        let b = result_dir(tmp.path(), "rhel/azure/b_1", "1");
        let a = result_dir(tmp.path(), "rhel/aws/a_0", "2");
        fs::write(b.join("results_streams.zip"), b"PK").unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();

        assert_eq!(discover_result_directories(tmp.path()).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_discover_rejects_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x.json");
        fs::write(&file, "{}").unwrap();
        assert!(discover_result_directories(&file).is_err());
    }

    #[test]
    fn test_unknown_format_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = result_dir(tmp.path(), "host_0", "100");
        fs::write(dir.join("results_fio.zip"), b"PK").unwrap();

        let mock = Arc::new(MockSender::new());
        let pipeline = Pipeline::with_reporter(targets(&mock), RecordingReporter::new())
            .with_registry(TEST_ADAPTERS);
        let stats = pipeline.process_all(&dir).unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors[0].0, "results_fio.zip");
        assert!(stats.errors[0].1.starts_with("SKIPPED"));
        assert!(pipeline.reporter().contains(Severity::Warn, "Unknown test type: fio"));
        assert_eq!(stats.exit_code(), 0);
    }

    #[test]
    fn test_parse_failure_does_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        result_dir(tmp.path(), "a_0", "not-a-number");
        result_dir(tmp.path(), "b_0", "42");

        let mock = Arc::new(MockSender::new());
        let pipeline = Pipeline::with_reporter(targets(&mock), RecordingReporter::new())
            .with_registry(TEST_ADAPTERS);
        let stats = pipeline.process_all(tmp.path()).unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.successful, 1);
        assert!(stats.errors[0].1.contains("bad score"));
        assert_eq!(stats.exit_code(), 1);
    }

    #[test]
    fn test_store_failure_counts_as_document_failure() {
        let tmp = TempDir::new().unwrap();
        let dir = result_dir(tmp.path(), "a_0", "42");

        let mock = Arc::new(MockSender::new());
        mock.always(MockReply::status(503, "unavailable"));
        let pipeline = Pipeline::with_reporter(targets(&mock), RecordingReporter::new())
            .with_registry(TEST_ADAPTERS);
        let stats = pipeline.process_all(&dir).unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.documents_created, 0);
        assert!(stats.is_failure());
    }

    #[test]
    fn test_duplicate_skips_timeseries_count() {
        let mock = Arc::new(MockSender::new());
        let pipeline = Pipeline::with_reporter(targets(&mock), RecordingReporter::new());
        let mut stats = ProcessingStats::new();

        let mut run = Run::new(0, "PASS");
        let mut series = OrderedMap::new();
        for i in 0..4 {
            series.insert(
                format!("sequence_{i}"),
                TimeSeriesPoint {
                    timestamp: "2025-11-06T14:30:00Z".into(),
                    metrics: Metrics::new(),
                },
            );
        }
        run.timeseries = Some(series);
        let mut runs = OrderedMap::new();
        runs.insert(run_key(0), run);
        let doc = CanonicalDocument {
            metadata: Metadata::new("2025-11-06T14:30:00Z"),
            test: TestInfo {
                name: "streams".into(),
                version: None,
                description: None,
            },
            system_under_test: Default::default(),
            test_configuration: Default::default(),
            results: Results::from_runs("PASS", runs),
        };

        let first = pipeline.export_document(doc.clone(), &mut stats).unwrap();
        let second = pipeline.export_document(doc, &mut stats).unwrap();

        assert_eq!(first.summary, Some(CreateOutcome::Created));
        assert_eq!(first.timeseries.map(|t| t.successful), Some(4));
        assert_eq!(second.summary, Some(CreateOutcome::Duplicate));
        assert!(second.timeseries.is_none());
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(stats.timeseries_indexed, 4);
        assert_eq!(stats.timeseries_skipped, 4);
        assert_eq!(mock.document_count("timeseries"), 4);
        assert_eq!(
            mock.document("summary", first.document_id.as_str()).unwrap()["results"]["runs"]["run_0"]
                .get("timeseries"),
            None
        );
    }
}
