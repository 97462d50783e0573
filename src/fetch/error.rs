//! Error types for outbound provider requests

use std::fmt;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Missing identifier or credential; raised before any network call
    Configuration(String),

    /// Timeout, connection failure or retryable status, after retries ran out
    Transient { url: String, reason: String },

    /// Non-retryable HTTP status
    Status { url: String, status: u16 },

    /// Response body was not valid JSON
    Decode { url: String, reason: String },

    /// Any other request failure (redirect loops, invalid request, ...)
    Request { url: String, reason: String },

    /// The HTTP client could not be constructed
    Client(String),
}

impl FetchError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, FetchError::Configuration(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Configuration(msg) => write!(f, "{msg}"),
            FetchError::Transient { url, reason } => {
                write!(f, "request to {url} failed after retries: {reason}")
            }
            FetchError::Status { url, status } => {
                write!(f, "request to {url} returned HTTP {status}")
            }
            FetchError::Decode { url, reason } => {
                write!(f, "invalid JSON from {url}: {reason}")
            }
            FetchError::Request { url, reason } => write!(f, "request to {url} failed: {reason}"),
            FetchError::Client(msg) => write!(f, "failed to build HTTP client: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}
