//! Error types for the execution control client

use agentwire_core::ProtocolError;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the execution control plane
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Network error (connection, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Invalid response (failed to parse a 2xx body)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error (missing base URL, bad token, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resume stream failed mid-read
    #[error("Stream error: {0}")]
    Stream(String),

    /// Another stream for the same thread is being read
    #[error("A stream is already open for thread {0}")]
    StreamConflict(String),
}

impl ExecutionError {
    /// HTTP status code, for `Http` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutionError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify an HTTP error into an appropriate error variant
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExecutionError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ExecutionError::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            ExecutionError::Network(format!("Request failed: {}", err))
        } else if let Some(status) = err.status() {
            ExecutionError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            ExecutionError::Stream(err.to_string())
        } else {
            ExecutionError::Network(err.to_string())
        }
    }

    /// Build an `Http` error from a non-2xx response body
    ///
    /// The message is taken from a JSON `detail`, `error` or `message` field,
    /// in that order; otherwise it is `HTTP <code>`.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        ExecutionError::Http {
            status,
            message: error_message(body).unwrap_or_else(|| format!("HTTP {}", status)),
        }
    }
}

impl From<ProtocolError> for ExecutionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::StreamConflict(thread_id) => ExecutionError::StreamConflict(thread_id),
            ProtocolError::Stream(message) => ExecutionError::Stream(message),
            ProtocolError::Json(e) => ExecutionError::Json(e),
            other => ExecutionError::InvalidResponse(other.to_string()),
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| match value.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            // FastAPI validation errors arrive as a list under `detail`.
            other => Some(other.to_string()),
        })
}
