//! Core types for result-export.
//!
//! This module contains the canonical document schema every format adapter
//! produces and every exporter consumes.

pub mod ordered;
pub mod schema;

// Re-export key types for convenience
pub use ordered::OrderedMap;
pub use schema::{
    CanonicalDocument, CpuInfo, DOCUMENT_TYPE, HardwareInfo, MemoryInfo, Metadata, Metrics,
    OperatingSystemInfo, PrimaryMetric, Results, Run, SCHEMA_VERSION, Scalar, StatisticalSummary,
    SystemConfiguration, SystemUnderTest, TestConfiguration, TestInfo, TimeSeriesPoint,
    TimeSeriesSummary, now_timestamp, run_key, sequence_key,
};
