//! Error types for stream decoding and event processing

use thiserror::Error;

/// Errors produced while decoding or routing an agent event stream
///
/// Per-frame failures never abort a stream: the router reports them through
/// [`crate::StreamEvent::Error`] and keeps going. These values are what the
/// error callback carries and what the stream driver returns when the
/// transport itself fails.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame payload was not valid JSON
    #[error("Failed to decode frame: {message} (payload: {payload})")]
    Decode { message: String, payload: String },

    /// Frame was valid JSON but lacked the fields its type requires
    #[error("Unexpected event shape for '{event_type}': {message}")]
    Shape { event_type: String, message: String },

    /// Underlying byte stream failed mid-read
    #[error("Stream error: {0}")]
    Stream(String),

    /// A stream for this thread is already being consumed
    #[error("A stream is already open for thread {0}")]
    StreamConflict(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Build a decode error, truncating very long payloads for display
    pub fn decode(err: &serde_json::Error, payload: &str) -> Self {
        const MAX_PAYLOAD: usize = 200;
        let payload = if payload.len() > MAX_PAYLOAD {
            let mut end = MAX_PAYLOAD;
            while !payload.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &payload[..end])
        } else {
            payload.to_string()
        };
        ProtocolError::Decode {
            message: err.to_string(),
            payload,
        }
    }

    /// Build a shape error for an event type
    pub fn shape(event_type: &str, message: impl Into<String>) -> Self {
        ProtocolError::Shape {
            event_type: event_type.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
