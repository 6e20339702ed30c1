//! Aggregate counters for one processing run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone)]
pub struct ProcessingStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// (test or archive name, message); skips are prefixed `SKIPPED:`
    pub errors: Vec<(String, String)>,
    pub processed_tests: BTreeMap<String, usize>,
    pub documents_created: usize,
    pub documents_duplicates: usize,
    pub timeseries_indexed: usize,
    pub timeseries_skipped: usize,
    pub timeseries_failed: usize,
    started: Instant,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        ProcessingStats {
            total: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            processed_tests: BTreeMap::new(),
            documents_created: 0,
            documents_duplicates: 0,
            timeseries_indexed: 0,
            timeseries_skipped: 0,
            timeseries_failed: 0,
            started: Instant::now(),
        }
    }
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, test_name: &str) {
        self.successful += 1;
        *self.processed_tests.entry(test_name.to_string()).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, test_name: &str, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push((test_name.to_string(), error.into()));
    }

    pub fn record_skip(&mut self, name: &str, reason: &str) {
        self.skipped += 1;
        self.errors.push((name.to_string(), format!("SKIPPED: {reason}")));
    }

    pub fn record_document_created(&mut self) {
        self.documents_created += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.documents_duplicates += 1;
    }

    pub fn record_timeseries_indexed(&mut self, count: usize) {
        self.timeseries_indexed += count;
    }

    /// Points not sent because their summary was a duplicate.
    pub fn record_timeseries_skipped(&mut self, count: usize) {
        self.timeseries_skipped += count;
    }

    pub fn record_timeseries_failed(&mut self, count: usize) {
        self.timeseries_failed += count;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// A run fails if any document failed or none succeeded.
    pub fn is_failure(&self) -> bool {
        self.failed > 0 || self.successful == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_failure() { 1 } else { 0 }
    }

    pub fn render_summary(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = vec![
            String::new(),
            rule.clone(),
            "PROCESSING SUMMARY".to_string(),
            rule.clone(),
            format!("Total: {}", self.total),
            format!("Successful: {}", self.successful),
            format!("Failed: {}", self.failed),
            format!("Skipped: {}", self.skipped),
            format!("Duration: {:.2} seconds", self.elapsed().as_secs_f64()),
            String::new(),
        ];

        if self.documents_created > 0 || self.documents_duplicates > 0 {
            out.push("Summary documents:".to_string());
            out.push(format!(
                "  Total: {}",
                self.documents_created + self.documents_duplicates
            ));
            out.push(format!("  Indexed: {}", self.documents_created));
            out.push(format!("  Duplicates (skipped): {}", self.documents_duplicates));
            out.push(String::new());
        }

        if self.timeseries_indexed > 0 || self.timeseries_skipped > 0 || self.timeseries_failed > 0 {
            out.push("Time series documents:".to_string());
            out.push(format!(
                "  Total: {}",
                self.timeseries_indexed + self.timeseries_skipped + self.timeseries_failed
            ));
            out.push(format!("  Indexed: {}", self.timeseries_indexed));
            out.push(format!("  Duplicates (skipped): {}", self.timeseries_skipped));
            if self.timeseries_failed > 0 {
                out.push(format!("  Failed: {}", self.timeseries_failed));
            }
            out.push(String::new());
        }

        if !self.processed_tests.is_empty() {
            out.push("Tests processed:".to_string());
            for (name, count) in &self.processed_tests {
                out.push(format!("  - {name}: {count}"));
            }
            out.push(String::new());
        }

        if !self.errors.is_empty() {
            out.push(format!("Errors ({}):", self.errors.len()));
            for (name, error) in &self.errors {
                out.push(format!("  - {name}: {error}"));
            }
            out.push(String::new());
        }

        out.push(rule);
        out.join("\n")
    }
}
