//! Exporters for the two-index store layout and the alternate run sink.
//!
//! The summary index holds one small document per benchmark run and is the
//! deduplication boundary. The time-series index holds the raw points and is
//! only written after the paired summary was newly created.

pub mod horreum;
pub mod index;
pub mod summary;
pub mod timeseries;

pub use horreum::{HorreumExporter, HorreumTarget, RunSink};
pub use index::{
    EXPORT_METADATA_KEY, IndexStatus, TOTAL_FIELDS_LIMIT, stamp_export_metadata,
    summary_index_body, timeseries_index_body,
};
pub use summary::{CreateOutcome, SummaryExporter};
pub use timeseries::{
    DEFAULT_BATCH_SIZE, TimeSeriesExportResult, TimeSeriesExporter, flatten_points,
};
