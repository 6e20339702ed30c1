//! Retry policy shared by single-document and bulk requests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{ExportError, ExportResult};

use super::http::{
    CONTENT_TYPE_JSON, CONTENT_TYPE_NDJSON, HttpRequest, HttpResponse, HttpSend, Method, SendError,
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How many attempts a request gets and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps, for tests and local stores.
    pub fn immediate(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Per-item outcome reported by a bulk request.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Bulk response: one entry per submitted item, in submission order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    /// True when at least one item failed; informational only
    #[serde(default)]
    pub errors: bool,
    /// Each item is keyed by its action name (`index`, `create`, ...)
    #[serde(default)]
    pub items: Vec<BTreeMap<String, BulkItemResult>>,
}

impl BulkResponse {
    pub fn outcomes(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter_map(|item| item.values().next())
    }

    pub fn successful_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes().filter(|o| !o.is_success()).count()
    }
}

/// Executes store requests under a [`RetryPolicy`].
///
/// 4xx responses fail on the first attempt. 5xx responses, connection
/// failures and undecodable bodies are retried until the policy is exhausted.
#[derive(Clone)]
pub struct RetryingTransport {
    sender: Arc<dyn HttpSend>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(sender: Arc<dyn HttpSend>, policy: RetryPolicy) -> Self {
        RetryingTransport { sender, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute a JSON request and decode the JSON response (`Null` if empty).
    pub fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> ExportResult<Value> {
        let mut request = HttpRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_body(serde_json::to_vec(body)?, CONTENT_TYPE_JSON);
        }
        self.send_with_retry(&request, decode_json)
    }

    /// Execute a request whose response body is plain text.
    pub fn execute_text(&self, method: Method, path: &str, body: Option<&Value>) -> ExportResult<String> {
        let mut request = HttpRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_body(serde_json::to_vec(body)?, CONTENT_TYPE_JSON);
        }
        self.send_with_retry(&request, |resp| Ok(resp.body.trim().to_string()))
    }

    /// POST an NDJSON body to `/_bulk`.
    ///
    /// Item-level failures come back inside the [`BulkResponse`], never as `Err`.
    pub fn execute_bulk(&self, ndjson: String) -> ExportResult<BulkResponse> {
        let request =
            HttpRequest::new(Method::Post, "/_bulk").with_body(ndjson.into_bytes(), CONTENT_TYPE_NDJSON);
        self.send_with_retry(&request, |resp| {
            serde_json::from_str::<BulkResponse>(&resp.body)
                .map_err(|e| format!("invalid bulk response: {e}"))
        })
    }

    fn send_with_retry<T>(
        &self,
        request: &HttpRequest,
        decode: impl Fn(&HttpResponse) -> Result<T, String>,
    ) -> ExportResult<T> {
        let max = self.policy.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max {
            match self.sender.send(request) {
                Ok(resp) if resp.is_success() => match decode(&resp) {
                    Ok(value) => {
                        debug!(method = request.method.as_str(), path = %request.path, status = resp.status, "request succeeded");
                        return Ok(value);
                    }
                    Err(e) => {
                        error!("Unexpected error on attempt {attempt}/{max}: {e}");
                        last_error = e;
                    }
                },
                Ok(resp) if resp.is_client_error() => {
                    debug!(path = %request.path, status = resp.status, "client error, not retrying");
                    return Err(ExportError::ClientRequest {
                        status: resp.status,
                        body: resp.body,
                    });
                }
                Ok(resp) => {
                    error!("HTTP {} error on attempt {attempt}/{max}: {}", resp.status, resp.body);
                    last_error = format!("HTTP {}: {}", resp.status, resp.body);
                }
                Err(SendError::Connection(e)) => {
                    error!("Connection error on attempt {attempt}/{max}: {e}");
                    last_error = e;
                }
                Err(SendError::Other(e)) => {
                    error!("Unexpected error on attempt {attempt}/{max}: {e}");
                    last_error = e;
                }
            }

            if attempt < max && !self.policy.retry_delay.is_zero() {
                warn!("retrying {} {} in {:?}", request.method.as_str(), request.path, self.policy.retry_delay);
                std::thread::sleep(self.policy.retry_delay);
            }
        }

        Err(ExportError::TransientTransport {
            attempts: max,
            message: last_error,
        })
    }
}

fn decode_json(resp: &HttpResponse) -> Result<Value, String> {
    if resp.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&resp.body).map_err(|e| format!("invalid JSON response: {e}"))
}
