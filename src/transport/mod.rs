//! Transport to the document store.
//!
//! `HttpSend` is the seam between the exporters and the network: `UreqSender`
//! talks to a real store, `MockSender` keeps an in-memory one for tests.
//! `RetryingTransport` layers the retry policy over either.

pub mod http;
pub mod mock;
pub mod retry;

pub use http::{
    Auth, CONTENT_TYPE_JSON, CONTENT_TYPE_NDJSON, HttpRequest, HttpResponse, HttpSend, Method,
    SendError, UreqSender,
};
pub use mock::{MockReply, MockSender, RecordedRequest};
pub use retry::{
    BulkItemResult, BulkResponse, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, RetryPolicy,
    RetryingTransport,
};
