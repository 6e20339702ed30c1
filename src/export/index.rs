//! Index creation bodies and the shared exists-or-create routine.

use serde_json::{Value, json};
use tracing::info;

use crate::transport::{Method, RetryingTransport};
use crate::{EXPORTER_NAME, EXPORTER_VERSION, ExportResult, core::now_timestamp};

/// Upper bound on mapped fields; run metrics fan out into many keys.
pub const TOTAL_FIELDS_LIMIT: u32 = 2000;

/// Key of the transport-only block added to every exported summary.
pub const EXPORT_METADATA_KEY: &str = "_export_metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Existing,
    Created,
}

fn settings() -> Value {
    json!({
        "number_of_shards": 1,
        "number_of_replicas": 1,
        "index": {
            "mapping": {
                "total_fields": { "limit": TOTAL_FIELDS_LIMIT }
            }
        }
    })
}

/// Settings and mappings for the summary index.
pub fn summary_index_body() -> Value {
    json!({
        "settings": settings(),
        "mappings": {
            "properties": {
                "metadata": {
                    "properties": {
                        "document_id": {"type": "keyword"},
                        "document_type": {"type": "keyword"},
                        "test_timestamp": {"type": "date"},
                        "processing_timestamp": {"type": "date"},
                        "os_vendor": {"type": "keyword"},
                        "cloud_provider": {"type": "keyword"},
                        "instance_type": {"type": "keyword"},
                        "scenario_name": {"type": "keyword"}
                    }
                },
                "test_run": {
                    "properties": {
                        "timestamp": {"type": "date"},
                        "zathras_version": {"type": "keyword"}
                    }
                },
                "infrastructure": {
                    "properties": {
                        "type": {"type": "keyword"},
                        "instance_type": {"type": "keyword"},
                        "region": {"type": "keyword"}
                    }
                },
                "test": {
                    "properties": {
                        "name": {"type": "keyword"},
                        "version": {"type": "keyword"},
                        "status": {"type": "keyword"},
                        "duration_seconds": {"type": "float"}
                    }
                }
            }
        }
    })
}

/// Settings and mappings for the time-series index.
pub fn timeseries_index_body() -> Value {
    json!({
        "settings": settings(),
        "mappings": {
            "properties": {
                "document_id": {"type": "keyword"},
                "test_name": {"type": "keyword"},
                "run_key": {"type": "keyword"},
                "run_number": {"type": "integer"},
                "sequence_key": {"type": "keyword"},
                "sequence": {"type": "integer"},
                "point_index": {"type": "long"},
                "timestamp": {"type": "date"},
                "environment": {
                    "properties": {
                        "os_vendor": {"type": "keyword"},
                        "cloud_provider": {"type": "keyword"},
                        "instance_type": {"type": "keyword"},
                        "scenario_name": {"type": "keyword"}
                    }
                }
            }
        }
    })
}

/// `HEAD` the index and `PUT` it with `body` when the store reports 404.
pub fn ensure_index(
    transport: &RetryingTransport,
    index: &str,
    body: &Value,
) -> ExportResult<IndexStatus> {
    let path = format!("/{index}");
    match transport.execute(Method::Head, &path, None) {
        Ok(_) => {
            info!("Index '{index}' already exists");
            Ok(IndexStatus::Existing)
        }
        Err(e) if e.client_status() == Some(404) => {
            transport.execute(Method::Put, &path, Some(body))?;
            info!("Created index '{index}'");
            Ok(IndexStatus::Created)
        }
        Err(e) => Err(e),
    }
}

/// Copy of `document` with the export metadata block attached.
pub fn stamp_export_metadata(document: &Value) -> Value {
    let mut copy = document.clone();
    if let Some(obj) = copy.as_object_mut() {
        obj.insert(
            EXPORT_METADATA_KEY.to_string(),
            json!({
                "exported_at": now_timestamp(),
                "exporter": EXPORTER_NAME,
                "exporter_version": EXPORTER_VERSION,
            }),
        );
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockSender, RetryPolicy};

    #[test]
    fn test_ensure_index_creates_once() {
        let mock = Arc::new(MockSender::new());
        let transport = RetryingTransport::new(mock.clone(), RetryPolicy::immediate(3));

        let body = summary_index_body();
        assert_eq!(ensure_index(&transport, "results", &body).unwrap(), IndexStatus::Created);
        assert_eq!(ensure_index(&transport, "results", &body).unwrap(), IndexStatus::Existing);

        let stored = mock.index_settings("results").unwrap();
        assert_eq!(stored["settings"]["index"]["mapping"]["total_fields"]["limit"], 2000);
        assert_eq!(stored["mappings"]["properties"]["test_run"]["properties"]["timestamp"]["type"], "date");
        assert_eq!(mock.count_requests(Method::Put, "/results"), 1);
    }

    #[test]
    fn test_stamp_leaves_original_untouched() {
        let original = json!({"test": {"name": "coremark"}});
        let stamped = stamp_export_metadata(&original);
        assert!(original.get(EXPORT_METADATA_KEY).is_none());
        assert_eq!(stamped[EXPORT_METADATA_KEY]["exporter"], EXPORTER_NAME);
        assert_eq!(stamped["test"]["name"], "coremark");
    }
}
