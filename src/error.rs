// Error types for campuspay.
// Classifies transport, HTTP status, decode and lookup failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CampusPayError {
    #[error("Network error on {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus {
        status: u16,
        url: String,
        body: Option<serde_json::Value>,
    },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Unknown operation `{method}` on service `{service}`")]
    Lookup { service: String, method: String },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource is being fetched: {0}")]
    Busy(String),

    #[error("Invalid argument for `{method}`: {message}")]
    InvalidArgument { method: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a failure, kept on resource records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    HttpStatus,
    Decode,
    Lookup,
    Other,
}

impl CampusPayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CampusPayError::Transport { .. } => ErrorKind::Transport,
            CampusPayError::HttpStatus { .. } => ErrorKind::HttpStatus,
            CampusPayError::Decode { .. } | CampusPayError::Json(_) => ErrorKind::Decode,
            CampusPayError::Lookup { .. } | CampusPayError::UnknownService(_) => {
                ErrorKind::Lookup
            }
            _ => ErrorKind::Other,
        }
    }

    /// No response was obtained at all.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// HTTP status code, when the failure came from an out-of-policy response.
    pub fn status(&self) -> Option<u16> {
        match self {
            CampusPayError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CampusPayError>;
