//! Export settings loaded from a YAML file.
//!
//! ```yaml
//! opensearch:
//!   url: http://localhost:9200
//!   summary_index: zathras-results
//!   timeseries_index: zathras-timeseries
//!   batch_size: 500
//! horreum:
//!   url: http://localhost:8080
//!   test: zathras
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::export::{DEFAULT_BATCH_SIZE, HorreumExporter, HorreumTarget, SummaryExporter, TimeSeriesExporter};
use crate::pipeline::{ExportTargets, OpenSearchTarget};
use crate::storage::JsonDirWriter;
use crate::transport::{
    Auth, DEFAULT_MAX_RETRIES, HttpSend, RetryPolicy, RetryingTransport, UreqSender,
};
use crate::{ExportError, ExportResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub opensearch: OpenSearchConfig,
    pub horreum: HorreumConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenSearchConfig {
    pub url: String,
    pub summary_index: String,
    pub timeseries_index: String,
    pub auth_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// Total attempts per request
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Time-series points per bulk request
    pub batch_size: usize,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        OpenSearchConfig {
            url: "http://localhost:9200".to_string(),
            summary_index: "zathras-results".to_string(),
            timeseries_index: "zathras-timeseries".to_string(),
            auth_token: None,
            username: None,
            password: None,
            timeout_secs: 30,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: 5,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl OpenSearchConfig {
    pub fn validate(&self) -> ExportResult<()> {
        if self.url.trim().is_empty() {
            return Err(ExportError::Configuration("opensearch.url is empty".into()));
        }
        if self.summary_index.is_empty() || self.timeseries_index.is_empty() {
            return Err(ExportError::Configuration("opensearch index names must be set".into()));
        }
        if self.max_retries == 0 {
            return Err(ExportError::Configuration("opensearch.max_retries must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ExportError::Configuration("opensearch.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn auth(&self) -> Auth {
        Auth::from_parts(
            self.auth_token.as_deref(),
            self.username.as_deref(),
            self.password.as_deref(),
        )
    }

    /// Summary and time-series exporters over an HTTP connection to `url`.
    pub fn exporters(&self) -> ExportResult<(SummaryExporter, TimeSeriesExporter)> {
        self.validate()?;
        let sender = UreqSender::new(&self.url, self.auth(), Duration::from_secs(self.timeout_secs));
        self.exporters_with(Arc::new(sender))
    }

    /// Same as [`exporters`](Self::exporters) over a caller-supplied sender.
    pub fn exporters_with(
        &self,
        sender: Arc<dyn HttpSend>,
    ) -> ExportResult<(SummaryExporter, TimeSeriesExporter)> {
        self.validate()?;
        let transport = RetryingTransport::new(sender, self.retry_policy());
        Ok((
            SummaryExporter::new(transport.clone(), self.summary_index.clone()),
            TimeSeriesExporter::new(transport, self.timeseries_index.clone()),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HorreumConfig {
    pub url: String,
    pub test: String,
    pub owner: String,
    pub access: String,
    pub auth_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HorreumConfig {
    fn default() -> Self {
        HorreumConfig {
            url: "http://localhost:8080".to_string(),
            test: "zathras".to_string(),
            owner: "perf-team".to_string(),
            access: "PUBLIC".to_string(),
            auth_token: None,
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

impl HorreumConfig {
    pub fn validate(&self) -> ExportResult<()> {
        if self.url.trim().is_empty() {
            return Err(ExportError::Configuration("horreum.url is empty".into()));
        }
        if self.test.is_empty() {
            return Err(ExportError::Configuration("horreum.test is empty".into()));
        }
        Ok(())
    }

    pub fn target(&self) -> HorreumTarget {
        HorreumTarget {
            test: self.test.clone(),
            owner: self.owner.clone(),
            access: self.access.clone(),
        }
    }

    pub fn exporter(&self) -> ExportResult<HorreumExporter> {
        self.validate()?;
        let auth = Auth::from_parts(
            self.auth_token.as_deref(),
            self.username.as_deref(),
            self.password.as_deref(),
        );
        let sender = UreqSender::new(&self.url, auth, Duration::from_secs(self.timeout_secs));
        self.exporter_with(Arc::new(sender))
    }

    pub fn exporter_with(&self, sender: Arc<dyn HttpSend>) -> ExportResult<HorreumExporter> {
        self.validate()?;
        let transport = RetryingTransport::new(sender, RetryPolicy::default());
        Ok(HorreumExporter::new(transport, self.target()))
    }
}

pub fn parse_config(yaml: &str) -> ExportResult<Config> {
    // an empty document deserializes to unit, not to a struct
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| ExportError::Configuration(e.to_string()))
}

/// Load settings from `path`.
///
/// A missing path or file yields the defaults; an unreadable or invalid file
/// is logged and also yields the defaults.
pub fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Config::default();
    };
    let loaded = std::fs::read_to_string(path)
        .map_err(ExportError::from)
        .and_then(|s| parse_config(&s));
    match loaded {
        Ok(cfg) => {
            info!("Loaded config from: {}", path.display());
            cfg
        }
        Err(e) => {
            error!("Failed to load config from {}: {e}", path.display());
            Config::default()
        }
    }
}

/// Export paths requested for one run.
#[derive(Debug, Clone, Default)]
pub struct TargetSelection {
    pub opensearch: bool,
    pub horreum: bool,
    pub output_json: Option<PathBuf>,
}

/// Build the requested export paths from `config`.
///
/// A path whose settings do not validate is logged and left disabled; the
/// other paths are unaffected.
pub fn build_targets(config: &Config, selection: &TargetSelection) -> ExportTargets {
    let mut targets = ExportTargets {
        json_output: selection.output_json.as_ref().map(JsonDirWriter::new),
        ..Default::default()
    };

    if selection.opensearch {
        match config.opensearch.exporters() {
            Ok((summary, timeseries)) => {
                info!("OpenSearch exporters initialized: {}", config.opensearch.url);
                targets.opensearch = Some(OpenSearchTarget {
                    summary,
                    timeseries,
                    batch_size: config.opensearch.batch_size,
                });
            }
            Err(e) => error!("OpenSearch export disabled: {e}"),
        }
    }
    if selection.horreum {
        match config.horreum.exporter() {
            Ok(exporter) => {
                info!("Horreum exporter initialized: {}", config.horreum.url);
                targets.run_sink = Some(Box::new(exporter));
            }
            Err(e) => error!("Horreum export disabled: {e}"),
        }
    }
    targets
}
