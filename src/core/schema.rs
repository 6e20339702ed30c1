//! Canonical document schema shared by every format adapter and exporter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ordered::OrderedMap;

/// Document type tag carried in every document's metadata.
pub const DOCUMENT_TYPE: &str = "zathras_test_result";

/// Schema revision written into metadata.
pub const SCHEMA_VERSION: &str = "1.0";

/// Key of the `n`th run in `Results::runs`.
pub fn run_key(n: usize) -> String {
    format!("run_{n}")
}

/// Key of the `n`th point in `Run::timeseries`.
pub fn sequence_key(n: usize) -> String {
    format!("sequence_{n}")
}

/// Current UTC time as an RFC 3339 string.
pub fn now_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// A single metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Convert a JSON scalar; arrays, objects and null have no scalar form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int(i64::from(v))
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

pub type Metrics = BTreeMap<String, Scalar>;

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Content-derived identifier; empty until identity resolution
    #[serde(default)]
    pub document_id: String,
    pub document_type: String,
    pub schema_version: String,
    /// When the benchmark ran (ISO 8601)
    pub test_timestamp: String,
    /// When this document was produced; volatile across reprocessing
    pub processing_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
}

impl Metadata {
    /// Metadata stamped with the current processing time and no identity yet.
    pub fn new(test_timestamp: impl Into<String>) -> Self {
        Metadata {
            document_id: String::new(),
            document_type: DOCUMENT_TYPE.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            test_timestamp: test_timestamp.into(),
            processing_timestamp: now_timestamp(),
            os_vendor: None,
            cloud_provider: None,
            instance_type: None,
            scenario_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_per_core: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_mhz: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_gb: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    #[serde(default)]
    pub cpu: CpuInfo,
    #[serde(default)]
    pub memory: MemoryInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingSystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
}

/// Tunables captured from the host (tuned profile, sysctl values, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuned_profile: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemUnderTest {
    #[serde(default)]
    pub hardware: HardwareInfo,
    #[serde(default)]
    pub operating_system: OperatingSystemInfo,
    #[serde(default)]
    pub configuration: SystemConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
}

/// Aggregate over the raw samples of one run's time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
}

impl TimeSeriesSummary {
    /// Summarize samples; `None` for an empty slice.
    ///
    /// `stddev` is the sample standard deviation and needs at least two samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let n = samples.len();
        if n == 0 {
            return None;
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        let stddev = if n > 1 {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(var.sqrt())
        } else {
            None
        };

        Some(TimeSeriesSummary {
            count: n,
            mean,
            median,
            min,
            max,
            stddev,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// ISO 8601 UTC
    pub timestamp: String,
    #[serde(default)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_number: u32,
    pub status: String,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<OrderedMap<TimeSeriesPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries_summary: Option<TimeSeriesSummary>,
}

impl Run {
    pub fn new(run_number: u32, status: impl Into<String>) -> Self {
        Run {
            run_number,
            status: status.into(),
            metrics: Metrics::new(),
            configuration: None,
            timeseries: None,
            timeseries_summary: None,
        }
    }

    pub fn timeseries_len(&self) -> usize {
        self.timeseries.as_ref().map_or(0, |ts| ts.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub status: String,
    pub total_runs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_metric: Option<PrimaryMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_statistics: Option<StatisticalSummary>,
    #[serde(default)]
    pub runs: OrderedMap<Run>,
}

impl Results {
    /// Results over `runs`, with `total_runs` taken from the map.
    pub fn from_runs(status: impl Into<String>, runs: OrderedMap<Run>) -> Self {
        Results {
            status: status.into(),
            total_runs: runs.len(),
            primary_metric: None,
            overall_statistics: None,
            runs,
        }
    }
}

/// Normalized benchmark document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub metadata: Metadata,
    pub test: TestInfo,
    #[serde(default)]
    pub system_under_test: SystemUnderTest,
    #[serde(default)]
    pub test_configuration: TestConfiguration,
    pub results: Results,
}

impl CanonicalDocument {
    /// Number of time-series points across all runs.
    pub fn timeseries_point_count(&self) -> usize {
        self.results.runs.values().map(Run::timeseries_len).sum()
    }

    /// Serialized document without the raw per-run time series.
    ///
    /// This is the body sent to the summary index; `timeseries_summary` stays.
    pub fn summary_view(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(runs) = value
            .pointer_mut("/results/runs")
            .and_then(|r| r.as_object_mut())
        {
            for run in runs.values_mut() {
                if let Some(obj) = run.as_object_mut() {
                    obj.remove("timeseries");
                }
            }
        }
        Ok(value)
    }
}
