//! Time-series exporter: flattens every run's points and bulk-indexes them in
//! fixed-size batches.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::ExportResult;
use crate::identity::IdentifiedDocument;
use crate::transport::RetryingTransport;

use super::index::{IndexStatus, ensure_index, stamp_export_metadata, timeseries_index_body};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Aggregate outcome over all batches of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeSeriesExportResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Writes time-series points into one index through the bulk endpoint.
#[derive(Clone)]
pub struct TimeSeriesExporter {
    transport: RetryingTransport,
    index: String,
}

impl TimeSeriesExporter {
    pub fn new(transport: RetryingTransport, index: impl Into<String>) -> Self {
        TimeSeriesExporter {
            transport,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn ensure_index(&self) -> ExportResult<IndexStatus> {
        ensure_index(&self.transport, &self.index, &timeseries_index_body())
    }

    /// Export every point of `document`, `batch_size` points per bulk request.
    ///
    /// A failed batch or item is counted and the remaining batches still go
    /// out; only serialization problems return `Err`.
    pub fn export_timeseries(
        &self,
        document: &IdentifiedDocument,
        batch_size: usize,
    ) -> ExportResult<TimeSeriesExportResult> {
        let points = flatten_points(document)?;
        let mut result = TimeSeriesExportResult {
            total: points.len(),
            ..Default::default()
        };
        if points.is_empty() {
            return Ok(result);
        }

        let batch_size = batch_size.max(1);
        let batches = points.len().div_ceil(batch_size);
        for (n, batch) in points.chunks(batch_size).enumerate() {
            let body = self.bulk_body(batch)?;
            match self.transport.execute_bulk(body) {
                Ok(resp) => {
                    let ok = resp.successful_count().min(batch.len());
                    result.successful += ok;
                    result.failed += batch.len() - ok;
                    if resp.errors {
                        warn!(
                            "Batch {}/{} for {} completed with {} errors",
                            n + 1,
                            batches,
                            document.id(),
                            batch.len() - ok
                        );
                    }
                }
                Err(e) => {
                    error!("Batch {}/{} for {} failed: {e}", n + 1, batches, document.id());
                    result.failed += batch.len();
                }
            }
        }

        info!(
            "Exported {}/{} time series points for {}",
            result.successful,
            result.total,
            document.id()
        );
        Ok(result)
    }

    fn bulk_body(&self, batch: &[Value]) -> ExportResult<String> {
        let action = serde_json::to_string(&json!({"index": {"_index": self.index}}))?;
        let mut body = String::new();
        for point in batch {
            body.push_str(&action);
            body.push('\n');
            body.push_str(&serde_json::to_string(&stamp_export_metadata(point))?);
            body.push('\n');
        }
        Ok(body)
    }
}

/// One standalone document per point, in run order then sequence order.
pub fn flatten_points(document: &IdentifiedDocument) -> ExportResult<Vec<Value>> {
    let doc = document.document();
    let meta = &doc.metadata;
    let environment = json!({
        "os_vendor": meta.os_vendor,
        "cloud_provider": meta.cloud_provider,
        "instance_type": meta.instance_type,
        "scenario_name": meta.scenario_name,
    });

    let mut points = Vec::with_capacity(doc.timeseries_point_count());
    for (run_key, run) in doc.results.runs.iter() {
        let Some(series) = &run.timeseries else {
            continue;
        };
        for (sequence, (sequence_key, point)) in series.iter().enumerate() {
            let point_index = points.len();
            let metrics = serde_json::to_value(&point.metrics)?;
            points.push(json!({
                "document_id": document.id(),
                "test_name": doc.test.name,
                "test_timestamp": meta.test_timestamp,
                "run_key": run_key,
                "run_number": run.run_number,
                "sequence_key": sequence_key,
                "sequence": sequence,
                "point_index": point_index,
                "timestamp": point.timestamp,
                "metrics": metrics,
                "environment": environment,
            }));
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::{
        CanonicalDocument, Metadata, Metrics, OrderedMap, Results, Run, Scalar, TestInfo,
        TimeSeriesPoint, run_key, sequence_key,
    };
    use crate::identity::HashOptions;
    use crate::transport::{MockSender, RetryPolicy};

    fn document(points_per_run: &[usize]) -> IdentifiedDocument {
        let mut runs = OrderedMap::new();
        for (r, count) in points_per_run.iter().enumerate() {
            let mut run = Run::new(r as u32, "PASS");
            let mut series = OrderedMap::new();
            for i in 0..*count {
                let mut metrics = Metrics::new();
                metrics.insert("value_seconds".into(), Scalar::Float(0.25 + i as f64));
                series.insert(
                    sequence_key(i),
                    TimeSeriesPoint {
                        timestamp: "2025-09-18T22:10:00Z".into(),
                        metrics,
                    },
                );
            }
            run.timeseries = Some(series);
            runs.insert(run_key(r), run);
        }
        let doc = CanonicalDocument {
            metadata: Metadata::new("2025-09-18T22:10:00Z"),
            test: TestInfo {
                name: "pyperf".into(),
                version: None,
                description: None,
            },
            system_under_test: Default::default(),
            test_configuration: Default::default(),
            results: Results::from_runs("PASS", runs),
        };
        IdentifiedDocument::resolve(doc, HashOptions::default()).unwrap()
    }

    fn exporter(mock: &Arc<MockSender>) -> TimeSeriesExporter {
        TimeSeriesExporter::new(
            RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3)),
            "timeseries",
        )
    }

    #[test]
    fn test_flatten_preserves_run_then_sequence_order() {
        let doc = document(&[2, 3]);
        let points = flatten_points(&doc).unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0]["run_key"], "run_0");
        assert_eq!(points[1]["sequence_key"], "sequence_1");
        assert_eq!(points[2]["run_key"], "run_1");
        assert_eq!(points[2]["sequence"], 0);
        assert_eq!(points[4]["point_index"], 4);
        assert_eq!(points[4]["document_id"], doc.id().as_str());
    }

    #[test]
    fn test_batches_are_fixed_size() {
        let mock = Arc::new(MockSender::new());
        let result = exporter(&mock).export_timeseries(&document(&[700, 300]), 500).unwrap();

        assert_eq!(result, TimeSeriesExportResult { total: 1000, successful: 1000, failed: 0 });
        assert_eq!(mock.count_requests(crate::transport::Method::Post, "/_bulk"), 2);
        assert_eq!(mock.document_count("timeseries"), 1000);
    }

    #[test]
    fn test_failed_batch_does_not_stop_the_rest() {
        let mock = Arc::new(MockSender::new());
        mock.fail_bulk_calls([0]);
        let result = exporter(&mock).export_timeseries(&document(&[25]), 10).unwrap();

        assert_eq!(result, TimeSeriesExportResult { total: 25, successful: 15, failed: 10 });
        assert_eq!(mock.document_count("timeseries"), 15);
    }

    #[test]
    fn test_indexed_points_carry_export_metadata() {
        let mock = Arc::new(MockSender::new());
        let doc = document(&[3]);
        exporter(&mock).export_timeseries(&doc, 2).unwrap();

        let stored = mock.documents("timeseries");
        assert_eq!(stored.len(), 3);
        for point in &stored {
            assert_eq!(point["_export_metadata"]["exporter"], crate::EXPORTER_NAME);
            assert_eq!(point["document_id"], doc.id().as_str());
        }
        assert!(flatten_points(&doc).unwrap()[0].get("_export_metadata").is_none());
    }

    #[test]
    fn test_no_points_sends_nothing() {
        let mock = Arc::new(MockSender::new());
        let result = exporter(&mock).export_timeseries(&document(&[0]), 500).unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(mock.request_count(), 0);
    }
}
