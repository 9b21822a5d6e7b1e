//! SSE event types

use serde::{Deserialize, Serialize};

/// A fully assembled SSE event, produced by the stream parser once the
/// terminating blank line of a frame has been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (from the `event:` field, defaults to "message")
    #[serde(rename = "event")]
    pub event_type: String,

    /// Event data; multiple `data:` lines are joined with "\n"
    pub data: String,

    /// Last event ID in effect when the frame was flushed. Persists across
    /// frames until the server sends a new `id:` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Reconnection interval in milliseconds, if the frame carried a
    /// `retry:` field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl Event {
    /// Create a new event with an explicit type
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Create a default-typed "message" event
    pub fn message(data: impl Into<String>) -> Self {
        Self::new("message", data)
    }

    /// Set the event ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the retry interval
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }
}
