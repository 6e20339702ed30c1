//! Alternate sink: uploads whole documents as runs to a Horreum server.

use tracing::info;
use url::form_urlencoded;

use crate::identity::IdentifiedDocument;
use crate::transport::{Method, RetryingTransport};
use crate::{ExportError, ExportResult};

/// A run-based store that accepts one document per call.
///
/// Unlike the summary index there is no create-if-absent contract here:
/// every call may create a new remote run.
pub trait RunSink: Send + Sync {
    fn name(&self) -> &str;

    /// Upload `document`, returning the remote run id.
    fn export(&self, document: &IdentifiedDocument) -> ExportResult<String>;
}

const RUN_TIMESTAMP_PATH: &str = "$.metadata.test_timestamp";

/// Run upload settings for one Horreum test.
#[derive(Debug, Clone)]
pub struct HorreumTarget {
    pub test: String,
    pub owner: String,
    pub access: String,
}

pub struct HorreumExporter {
    transport: RetryingTransport,
    target: HorreumTarget,
}

impl HorreumExporter {
    pub fn new(transport: RetryingTransport, target: HorreumTarget) -> Self {
        HorreumExporter { transport, target }
    }

    fn upload_path(&self) -> String {
        // start/stop are JSONPath expressions evaluated by the server
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("test", &self.target.test)
            .append_pair("start", RUN_TIMESTAMP_PATH)
            .append_pair("stop", RUN_TIMESTAMP_PATH)
            .append_pair("owner", &self.target.owner)
            .append_pair("access", &self.target.access)
            .finish();
        format!("/api/run/data?{query}")
    }
}

impl RunSink for HorreumExporter {
    fn name(&self) -> &str {
        "horreum"
    }

    fn export(&self, document: &IdentifiedDocument) -> ExportResult<String> {
        let body = serde_json::to_value(document.document())?;
        let run_id = self
            .transport
            .execute_text(Method::Post, &self.upload_path(), Some(&body))?;
        if run_id.is_empty() {
            return Err(ExportError::Message("run upload returned no run id".into()));
        }
        info!("Uploaded {} as run {run_id}", document.id());
        Ok(run_id)
    }
}
