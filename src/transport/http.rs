//! HTTP sending seam and its `ureq` implementation.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::{EXPORTER_NAME, EXPORTER_VERSION};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A request relative to the sender's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus optional query string, starting with `/`
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub content_type: &'static str,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        HttpRequest {
            method,
            path: path.into(),
            body: None,
            content_type: CONTENT_TYPE_JSON,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: &'static str) -> Self {
        self.body = Some(body);
        self.content_type = content_type;
        self
    }
}

/// Any response that made it back from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Failure to obtain any response at all.
#[derive(Debug, Error)]
pub enum SendError {
    /// DNS, TLS, connect or read timeout.
    #[error("connection error: {0}")]
    Connection(String),
    #[error("{0}")]
    Other(String),
}

/// Sends one HTTP request and returns the raw response.
///
/// Implementations report every HTTP status as `Ok`; classification and
/// retrying are the caller's job.
pub trait HttpSend: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError>;
}

/// Credentials attached to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl Auth {
    /// Pick bearer if a token is given, otherwise basic if both halves are.
    pub fn from_parts(
        token: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Self {
        match (token, username, password) {
            (Some(t), _, _) if !t.is_empty() => Auth::Bearer(t.to_string()),
            (_, Some(u), Some(p)) => Auth::Basic {
                username: u.to_string(),
                password: p.to_string(),
            },
            _ => Auth::None,
        }
    }

    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Bearer(token) => Some(format!("Bearer {token}")),
            Auth::Basic { username, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{username}:{password}"))
            )),
        }
    }
}

/// Blocking sender backed by a pooled `ureq` agent.
pub struct UreqSender {
    agent: ureq::Agent,
    base_url: String,
    auth: Auth,
}

impl UreqSender {
    pub fn new(base_url: &str, auth: Auth, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(&format!("{EXPORTER_NAME}/{EXPORTER_VERSION}"))
            .build();
        UreqSender {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl HttpSend for UreqSender {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut req = self
            .agent
            .request(request.method.as_str(), &url)
            .set("Accept", CONTENT_TYPE_JSON)
            .set("Content-Type", request.content_type);
        if let Some(auth) = self.auth.header_value() {
            req = req.set("Authorization", &auth);
        }

        let result = match &request.body {
            Some(body) => req.send_bytes(body),
            None => req.call(),
        };

        match result {
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .into_string()
                    .map_err(|e| SendError::Other(format!("failed to read response: {e}")))?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, resp)) => Ok(HttpResponse {
                status,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => Err(SendError::Connection(t.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_from_parts_prefers_token() {
        let auth = Auth::from_parts(Some("abc"), Some("u"), Some("p"));
        assert_eq!(auth.header_value().as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_basic_auth_header() {
        let auth = Auth::from_parts(None, Some("admin"), Some("secret"));
        // base64("admin:secret")
        assert_eq!(auth.header_value().as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
    }

    #[test]
    fn test_no_auth_without_password() {
        let auth = Auth::from_parts(None, Some("admin"), None);
        assert_eq!(auth, Auth::None);
        assert!(auth.header_value().is_none());
    }

    #[test]
    fn test_response_classification() {
        assert!(HttpResponse::new(201, "").is_success());
        assert!(HttpResponse::new(409, "").is_client_error());
        assert!(!HttpResponse::new(503, "").is_client_error());
        assert!(!HttpResponse::new(503, "").is_success());
    }

    #[test]
    fn test_sender_trims_base_url() {
        let sender = UreqSender::new("http://localhost:9200/", Auth::None, Duration::from_secs(1));
        assert_eq!(sender.base_url(), "http://localhost:9200");
    }
}
