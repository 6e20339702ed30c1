//! In-memory document store for testing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Value, json};

use super::http::{HttpRequest, HttpResponse, HttpSend, Method, SendError};

/// A canned reply that overrides the store's normal routing.
#[derive(Debug, Clone)]
pub enum MockReply {
    Status { status: u16, body: String },
    ConnectionRefused,
}

impl MockReply {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Status {
            status,
            body: body.into(),
        }
    }
}

/// A request as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

#[derive(Default)]
struct MockState {
    indices: BTreeMap<String, BTreeMap<String, Value>>,
    index_settings: BTreeMap<String, Value>,
    runs: Vec<(String, Value)>,
    scripted: VecDeque<MockReply>,
    always: Option<MockReply>,
    failing_bulk_items: BTreeSet<usize>,
    failing_bulk_calls: BTreeSet<usize>,
    bulk_items_seen: usize,
    bulk_calls_seen: usize,
    next_id: u64,
    requests: Vec<RecordedRequest>,
}

/// Mock store speaking the subset of the search-engine REST API the
/// exporters use.
///
/// Conditional creates really are conditional: a second `_create` at the same
/// id returns 409 and leaves the stored document alone. Scripted replies and
/// injected bulk failures let tests exercise the retry and partial-failure
/// paths without a network.
pub struct MockSender {
    state: Mutex<MockState>,
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSender {
    pub fn new() -> Self {
        MockSender {
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a reply used for the next unscripted request.
    pub fn push_reply(&self, reply: MockReply) {
        self.state().scripted.push_back(reply);
    }

    /// Answer every request with `reply` from now on.
    pub fn always(&self, reply: MockReply) {
        self.state().always = Some(reply);
    }

    /// Fail bulk items by their zero-based position across all bulk calls.
    pub fn fail_bulk_items(&self, positions: impl IntoIterator<Item = usize>) {
        self.state().failing_bulk_items.extend(positions);
    }

    /// Reject whole bulk calls (zero-based call number) with a 400.
    pub fn fail_bulk_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.state().failing_bulk_calls.extend(calls);
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Requests with `method` whose path starts with `prefix`.
    pub fn count_requests(&self, method: Method, prefix: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    pub fn index_exists(&self, index: &str) -> bool {
        self.state().indices.contains_key(index)
    }

    pub fn index_settings(&self, index: &str) -> Option<Value> {
        self.state().index_settings.get(index).cloned()
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.state().indices.get(index).map_or(0, |docs| docs.len())
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state().indices.get(index).and_then(|docs| docs.get(id).cloned())
    }

    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state()
            .indices
            .get(index)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Runs received on the run-upload endpoint, with their query strings.
    pub fn runs(&self) -> Vec<(String, Value)> {
        self.state().runs.clone()
    }
}

impl HttpSend for MockSender {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
        let mut state = self.state();
        let body = request
            .body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned());
        state.requests.push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            body: body.clone(),
        });

        let reply = state.scripted.pop_front().or_else(|| state.always.clone());
        if let Some(reply) = reply {
            return match reply {
                MockReply::Status { status, body } => Ok(HttpResponse::new(status, body)),
                MockReply::ConnectionRefused => {
                    Err(SendError::Connection("connection refused".into()))
                }
            };
        }

        Ok(route(&mut state, request.method, &request.path, body.as_deref()))
    }
}

fn json_response(status: u16, value: Value) -> HttpResponse {
    HttpResponse::new(status, value.to_string())
}

fn route(state: &mut MockState, method: Method, path: &str, body: Option<&str>) -> HttpResponse {
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (Method::Get, []) => json_response(
            200,
            json!({"cluster_name": "mock-cluster", "version": {"number": "2.11.0"}}),
        ),
        (Method::Head, [index]) => {
            let status = if state.indices.contains_key(*index) { 200 } else { 404 };
            HttpResponse::new(status, "")
        }
        (Method::Put, [index]) => create_index(state, index, body),
        (Method::Put, [index, "_create", id]) => match parse_body(body) {
            Ok(doc) => conditional_create(state, index, id, doc),
            Err(resp) => resp,
        },
        (Method::Put | Method::Post, [index, "_doc", id]) => match parse_body(body) {
            Ok(doc) => upsert(state, index, id, doc),
            Err(resp) => resp,
        },
        (Method::Post, [index, "_doc"]) => match parse_body(body) {
            Ok(doc) => {
                let id = next_id(state);
                upsert(state, index, &id, doc)
            }
            Err(resp) => resp,
        },
        (Method::Post, ["_bulk"]) => bulk(state, body.unwrap_or_default()),
        (Method::Post, [index, "_search"]) => search(state, index, body),
        (Method::Delete, [index, "_doc", id]) => {
            let removed = state
                .indices
                .get_mut(*index)
                .and_then(|docs| docs.remove(*id))
                .is_some();
            if removed {
                json_response(200, json!({"_index": index, "_id": id, "result": "deleted"}))
            } else {
                json_response(404, json!({"_index": index, "_id": id, "result": "not_found"}))
            }
        }
        (Method::Post, ["api", "run", "data"]) => match parse_body(body) {
            Ok(doc) => {
                state.runs.push((query.to_string(), doc));
                HttpResponse::new(200, (1000 + state.runs.len()).to_string())
            }
            Err(resp) => resp,
        },
        _ => json_response(404, json!({"error": format!("no handler for {path}")})),
    }
}

fn parse_body(body: Option<&str>) -> Result<Value, HttpResponse> {
    serde_json::from_str(body.unwrap_or_default()).map_err(|e| {
        json_response(
            400,
            json!({"error": {"type": "mapper_parsing_exception", "reason": e.to_string()}}),
        )
    })
}

fn next_id(state: &mut MockState) -> String {
    state.next_id += 1;
    format!("mock-{}", state.next_id)
}

fn create_index(state: &mut MockState, index: &str, body: Option<&str>) -> HttpResponse {
    if state.indices.contains_key(index) {
        return json_response(
            400,
            json!({"error": {"type": "resource_already_exists_exception"}, "status": 400}),
        );
    }
    let settings = body
        .and_then(|b| serde_json::from_str(b).ok())
        .unwrap_or(Value::Null);
    state.indices.insert(index.to_string(), BTreeMap::new());
    state.index_settings.insert(index.to_string(), settings);
    json_response(200, json!({"acknowledged": true, "index": index}))
}

fn conditional_create(state: &mut MockState, index: &str, id: &str, doc: Value) -> HttpResponse {
    let docs = state.indices.entry(index.to_string()).or_default();
    if docs.contains_key(id) {
        return json_response(
            409,
            json!({
                "error": {"type": "version_conflict_engine_exception",
                          "reason": format!("[{id}]: version conflict, document already exists")},
                "status": 409
            }),
        );
    }
    docs.insert(id.to_string(), doc);
    json_response(201, json!({"_index": index, "_id": id, "result": "created"}))
}

fn upsert(state: &mut MockState, index: &str, id: &str, doc: Value) -> HttpResponse {
    let docs = state.indices.entry(index.to_string()).or_default();
    let (status, result) = match docs.insert(id.to_string(), doc) {
        Some(_) => (200, "updated"),
        None => (201, "created"),
    };
    json_response(status, json!({"_index": index, "_id": id, "result": result}))
}

fn bulk(state: &mut MockState, body: &str) -> HttpResponse {
    let call = state.bulk_calls_seen;
    state.bulk_calls_seen += 1;
    if state.failing_bulk_calls.contains(&call) {
        return json_response(
            400,
            json!({"error": {"type": "illegal_argument_exception", "reason": "injected bulk failure"}}),
        );
    }

    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() % 2 != 0 {
        return json_response(
            400,
            json!({"error": {"type": "illegal_argument_exception", "reason": "odd number of bulk lines"}}),
        );
    }

    let mut items = Vec::new();
    let mut errors = false;
    for pair in lines.chunks(2) {
        let position = state.bulk_items_seen;
        state.bulk_items_seen += 1;

        let action: Value = serde_json::from_str(pair[0]).unwrap_or(Value::Null);
        let index = action
            .pointer("/index/_index")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let doc: Option<Value> = serde_json::from_str(pair[1]).ok();

        match doc {
            Some(doc) if !state.failing_bulk_items.contains(&position) => {
                let id = next_id(state);
                state.indices.entry(index.clone()).or_default().insert(id.clone(), doc);
                items.push(json!({"index": {"_index": index, "_id": id, "status": 201, "result": "created"}}));
            }
            _ => {
                errors = true;
                items.push(json!({"index": {
                    "_index": index,
                    "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}
                }}));
            }
        }
    }

    json_response(200, json!({"took": 1, "errors": errors, "items": items}))
}

fn search(state: &MockState, index: &str, body: Option<&str>) -> HttpResponse {
    let Some(docs) = state.indices.get(index) else {
        return json_response(
            404,
            json!({"error": {"type": "index_not_found_exception"}, "status": 404}),
        );
    };

    let query: Value = body
        .and_then(|b| serde_json::from_str(b).ok())
        .unwrap_or(Value::Null);
    let term = query
        .pointer("/query/term")
        .and_then(Value::as_object)
        .and_then(|t| t.iter().next());

    let hits: Vec<Value> = docs
        .iter()
        .filter(|(_, doc)| match term {
            Some((field, expected)) => {
                let field = field.trim_end_matches(".keyword");
                let expected = expected.get("value").unwrap_or(expected);
                let pointer = format!("/{}", field.replace('.', "/"));
                doc.pointer(&pointer) == Some(expected)
            }
            None => true,
        })
        .map(|(id, doc)| json!({"_index": index, "_id": id, "_source": doc}))
        .collect();

    json_response(
        200,
        json!({"hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}}),
    )
}
