//! Summary exporter: one document per benchmark run, created only if absent.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::identity::{DocumentId, IdentifiedDocument};
use crate::transport::{Method, RetryingTransport};
use crate::{ExportError, ExportResult};

use super::index::{IndexStatus, ensure_index, stamp_export_metadata, summary_index_body};

/// Status the store answers when `_create` hits an existing id.
const CONFLICT: u16 = 409;

/// Result of a conditional create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The id was already stored; nothing was written.
    Duplicate,
}

impl CreateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreateOutcome::Created => "created",
            CreateOutcome::Duplicate => "duplicate",
        }
    }
}

/// Writes summary documents into one index.
#[derive(Clone)]
pub struct SummaryExporter {
    transport: RetryingTransport,
    index: String,
}

impl SummaryExporter {
    pub fn new(transport: RetryingTransport, index: impl Into<String>) -> Self {
        SummaryExporter {
            transport,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Probe the cluster root; logs the cluster name on success.
    pub fn test_connection(&self) -> bool {
        match self.transport.execute(Method::Get, "/", None) {
            Ok(resp) => {
                let name = resp
                    .get("cluster_name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                info!("Connected to cluster: {name}");
                true
            }
            Err(e) => {
                error!("Connection test failed: {e}");
                false
            }
        }
    }

    pub fn ensure_index(&self) -> ExportResult<IndexStatus> {
        ensure_index(&self.transport, &self.index, &summary_index_body())
    }

    /// Create `summary` at `doc_id` unless that id is already stored.
    ///
    /// An existing document is never overwritten or merged into.
    pub fn create_document(&self, summary: &Value, doc_id: &DocumentId) -> ExportResult<CreateOutcome> {
        let body = stamp_export_metadata(summary);
        let path = format!("/{}/_create/{}", self.index, doc_id);
        match self.transport.execute(Method::Put, &path, Some(&body)) {
            Ok(_) => {
                info!("Created document: {doc_id}");
                Ok(CreateOutcome::Created)
            }
            Err(ExportError::ClientRequest { status: CONFLICT, .. }) => {
                warn!("Document already exists, skipped: {doc_id}");
                Ok(CreateOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    /// Create the summary view of `document` at its resolved id.
    pub fn export_summary(&self, document: &IdentifiedDocument) -> ExportResult<CreateOutcome> {
        let summary = document.document().summary_view()?;
        self.create_document(&summary, document.id())
    }

    /// Index `document` unconditionally, overwriting any document at `doc_id`.
    ///
    /// Returns the id the store assigned or kept.
    pub fn export_document(&self, document: &Value, doc_id: Option<&str>) -> ExportResult<String> {
        let body = stamp_export_metadata(document);
        let (method, path) = match doc_id {
            Some(id) => (Method::Put, format!("/{}/_doc/{}", self.index, id)),
            None => (Method::Post, format!("/{}/_doc", self.index)),
        };
        let resp = self.transport.execute(method, &path, Some(&body))?;
        let id = resp
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| doc_id.map(str::to_string))
            .ok_or_else(|| ExportError::Message("store response carried no _id".into()))?;
        info!("Exported document with ID: {id}");
        Ok(id)
    }

    pub fn search(&self, query: &Value) -> ExportResult<Value> {
        self.transport
            .execute(Method::Post, &format!("/{}/_search", self.index), Some(query))
    }

    /// Remove a document; `Ok(false)` when it was not there.
    pub fn delete_document(&self, doc_id: &str) -> ExportResult<bool> {
        let path = format!("/{}/_doc/{}", self.index, doc_id);
        match self.transport.execute(Method::Delete, &path, None) {
            Ok(_) => {
                info!("Deleted document: {doc_id}");
                Ok(true)
            }
            Err(e) if e.client_status() == Some(404) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
