pub mod adapters;
pub mod config;
pub mod core;
pub mod export;
pub mod identity;
pub mod pipeline;
pub mod storage;
pub mod transport;

use thiserror::Error;

/// Name reported in export metadata and the user agent.
pub const EXPORTER_NAME: &str = "zathras-result-export";

/// Version reported in export metadata.
pub const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum ExportError {
    /// 4xx from the store; the request itself is wrong and retrying cannot help.
    #[error("client error {status}: {body}")]
    ClientRequest { status: u16, body: String },
    /// 5xx or connection failure that outlived every retry.
    #[error("request failed after {attempts} attempts: {message}")]
    TransientTransport { attempts: u32, message: String },
    /// An adapter could not decode its raw input.
    #[error("format error: {0}")]
    Format(String),
    /// Missing or invalid export settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

impl ExportError {
    /// HTTP status of a client error, if this is one.
    pub fn client_status(&self) -> Option<u16> {
        match self {
            ExportError::ClientRequest { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
