//! PyPerf adapter: every benchmark in `pyperf_out_*.json` becomes one run,
//! every measured value one time-series point.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::PrimitiveDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::core::{
    CanonicalDocument, Metadata, Metrics, OrderedMap, Results, Run, Scalar, SystemUnderTest,
    TestConfiguration, TestInfo, TimeSeriesPoint, TimeSeriesSummary, run_key, sequence_key,
};
use crate::{ExportError, ExportResult};

use super::{EnvironmentTags, FormatAdapter, ResultArchive};

const OUTPUT_PREFIX: &str = "pyperf_out_";
const OUTPUT_SUFFIX: &str = ".json";

/// Keys copied from benchmark metadata into each run's configuration.
const CONFIG_KEYS: &[&str] = &[
    "python_version",
    "python_implementation",
    "python_compiler",
    "python_executable",
    "timer",
];

#[derive(Debug, Deserialize)]
struct PyPerfSuite {
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    benchmarks: Vec<PyPerfBenchmark>,
}

#[derive(Debug, Deserialize)]
struct PyPerfBenchmark {
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    runs: Vec<PyPerfRun>,
}

#[derive(Debug, Deserialize)]
struct PyPerfRun {
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PyPerfAdapter;

impl FormatAdapter for PyPerfAdapter {
    fn test_name(&self) -> &str {
        "pyperf"
    }

    fn parse(&self, result_dir: &Path, archive: &ResultArchive) -> ExportResult<CanonicalDocument> {
        let contents = archive.open(result_dir)?;
        let path = find_output_file(contents.dirs())?.ok_or_else(|| {
            ExportError::Format(format!(
                "no {OUTPUT_PREFIX}*{OUTPUT_SUFFIX} found for {} in {}",
                archive.name(),
                result_dir.display()
            ))
        })?;
        debug!("Reading PyPerf results from {}", path.display());

        let raw = std::fs::read_to_string(&path)?;
        let suite: PyPerfSuite = serde_json::from_str(&raw)
            .map_err(|e| ExportError::Format(format!("{}: {e}", path.display())))?;
        if suite.benchmarks.is_empty() {
            return Err(ExportError::Format(format!(
                "{} holds no benchmarks",
                path.display()
            )));
        }

        let mut doc = build_document(&suite, || file_timestamp(contents.dated_by(&path)))?;
        EnvironmentTags::from_result_dir(result_dir).apply(&mut doc);
        info!("Parsed {} PyPerf benchmarks", doc.results.total_runs);
        Ok(doc)
    }
}

/// First matching output file by name, searching `dirs` in order.
fn find_output_file(dirs: &[PathBuf]) -> ExportResult<Option<PathBuf>> {
    for dir in dirs {
        let mut found: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_output = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(OUTPUT_PREFIX) && n.ends_with(OUTPUT_SUFFIX));
            if is_output && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        if let Some(first) = found.into_iter().next() {
            return Ok(Some(first));
        }
    }
    Ok(None)
}

fn build_document(
    suite: &PyPerfSuite,
    fallback_timestamp: impl FnOnce() -> ExportResult<String>,
) -> ExportResult<CanonicalDocument> {
    // earliest run date of the suite
    let test_timestamp = match suite
        .benchmarks
        .iter()
        .flat_map(|b| &b.runs)
        .filter_map(|r| r.metadata.get("date").and_then(Value::as_str))
        .filter_map(convert_date)
        .min()
    {
        Some(ts) => ts,
        None => fallback_timestamp()?,
    };

    let mut runs = OrderedMap::new();
    for (n, benchmark) in suite.benchmarks.iter().enumerate() {
        let mut merged = suite.metadata.clone();
        merged.extend(benchmark.metadata.clone());
        runs.insert(run_key(n), build_run(n as u32, &merged, benchmark, &test_timestamp));
    }

    let meta = &suite.metadata;
    let text = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);

    let mut sut = SystemUnderTest::default();
    sut.hardware.cpu.model = text("cpu_model_name");
    sut.hardware.cpu.cores = meta
        .get("cpu_count")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok());
    for key in ["platform", "cpu_config", "hostname"] {
        if let Some(v) = meta.get(key) {
            sut.configuration.settings.insert(key.to_string(), v.clone());
        }
    }

    let mut parameters = BTreeMap::new();
    parameters.insert("benchmark_count".to_string(), Value::from(suite.benchmarks.len()));
    if let Some(v) = meta.get("python_version") {
        parameters.insert("python_version".to_string(), v.clone());
    }

    Ok(CanonicalDocument {
        metadata: Metadata::new(test_timestamp),
        test: TestInfo {
            name: "pyperf".to_string(),
            version: text("perf_version"),
            description: Some("Python performance benchmark suite".to_string()),
        },
        system_under_test: sut,
        test_configuration: TestConfiguration { parameters },
        // pyperf has no pass/fail notion
        results: Results::from_runs("PASS", runs),
    })
}

fn build_run(
    run_number: u32,
    metadata: &Map<String, Value>,
    benchmark: &PyPerfBenchmark,
    fallback_timestamp: &str,
) -> Run {
    let mut run = Run::new(run_number, "PASS");

    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("benchmark_{run_number}"));
    run.metrics.insert("benchmark_name".into(), Scalar::Text(name));
    run.metrics.insert(
        "description".into(),
        metadata
            .get("description")
            .and_then(Scalar::from_json)
            .unwrap_or_else(|| Scalar::Text(String::new())),
    );
    run.metrics.insert(
        "loops".into(),
        metadata
            .get("loops")
            .and_then(Scalar::from_json)
            .unwrap_or(Scalar::Int(0)),
    );

    let samples: Vec<f64> = benchmark.runs.iter().flat_map(|r| r.values.iter().copied()).collect();
    let summary = TimeSeriesSummary::from_samples(&samples);
    if let Some(s) = &summary {
        run.metrics.insert("mean_seconds".into(), Scalar::Float(s.mean));
        run.metrics.insert("median_seconds".into(), Scalar::Float(s.median));
        if let Some(stddev) = s.stddev {
            run.metrics.insert("stdev_seconds".into(), Scalar::Float(stddev));
        }
        run.metrics.insert("min_seconds".into(), Scalar::Float(s.min));
        run.metrics.insert("max_seconds".into(), Scalar::Float(s.max));
        run.metrics.insert("num_samples".into(), Scalar::Int(s.count as i64));
    }

    let mut series = OrderedMap::new();
    for pyperf_run in &benchmark.runs {
        let rm = &pyperf_run.metadata;
        let timestamp = rm
            .get("date")
            .and_then(Value::as_str)
            .and_then(convert_date)
            .unwrap_or_else(|| fallback_timestamp.to_string());

        for value in &pyperf_run.values {
            let mut metrics = Metrics::new();
            metrics.insert("value_seconds".into(), Scalar::Float(*value));
            for (from, to) in [
                ("cpu_freq", "cpu_freq"),
                ("mem_max_rss", "mem_max_rss_bytes"),
                ("duration", "run_duration_seconds"),
            ] {
                if let Some(v) = rm.get(from).and_then(Scalar::from_json) {
                    metrics.insert(to.into(), v);
                }
            }
            series.insert(
                sequence_key(series.len()),
                TimeSeriesPoint {
                    timestamp: timestamp.clone(),
                    metrics,
                },
            );
        }
    }

    let mut config: BTreeMap<String, Value> = CONFIG_KEYS
        .iter()
        .map(|key| {
            let v = metadata.get(*key).cloned().unwrap_or_else(|| Value::from(""));
            (key.to_string(), v)
        })
        .collect();
    if let Some(tags) = metadata.get("tags").filter(|t| !is_empty_value(t)) {
        config.insert("tags".into(), tags.clone());
    }

    run.configuration = Some(config);
    if !series.is_empty() {
        run.timeseries = Some(series);
    }
    run.timeseries_summary = summary;
    run
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// `2025-09-18 22:10:00.123456` → `2025-09-18T22:10:00Z`.
pub fn convert_date(raw: &str) -> Option<String> {
    let head = raw.get(..19)?.replacen('T', " ", 1);
    let dt =
        PrimitiveDateTime::parse(&head, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .ok()?;
    dt.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .ok()
}

/// Modification time of `path`; stable across reprocessing of the same file.
fn file_timestamp(path: &Path) -> ExportResult<String> {
    let modified = std::fs::metadata(path)?.modified()?;
    time::OffsetDateTime::from(modified)
        .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .map_err(|e| ExportError::Message(format!("cannot format file time: {e}")))
}
