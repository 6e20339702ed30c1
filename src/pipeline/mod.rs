//! Orchestration: result directories in, exported documents and a
//! processing report out.

pub mod orchestrator;
pub mod reporter;
pub mod stats;

pub use orchestrator::{
    DocumentOutcome, ExportTargets, OpenSearchTarget, Pipeline, discover_result_directories,
};
pub use reporter::{RecordingReporter, Reporter, Severity, TracingReporter};
pub use stats::ProcessingStats;
