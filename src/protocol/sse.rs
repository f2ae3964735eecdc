//! Server-sent event framing.
//!
//! Outbound frames produced by the agent (ping, error reports) and the
//! relayed page stream all use the `text/event-stream` format:
//!
//! ```text
//! event: ping
//! data: {"type":"ping"}
//!
//! ```
//!
//! [`SseDecoder`] reassembles events from arbitrarily split byte chunks.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Event name of the liveness frame sent on every connect.
pub const PING_EVENT: &str = "ping";

/// Event name of error frames.
pub const ERROR_EVENT: &str = "error";

/// Event name that terminates one chat response.
pub const MESSAGE_STOP_EVENT: &str = "message_stop";

/// Error kind reported when an inbound frame cannot be decoded.
pub const DECODE_ERROR_KIND: &str = "decode_error";

/// Error kind reported when a capability panics.
pub const EXECUTION_PANIC_KIND: &str = "execution_panic";

// ============================================================================
// Error Report
// ============================================================================

#[derive(Serialize)]
struct ErrorReport<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    message: &'a str,
}

// ============================================================================
// SseEvent
// ============================================================================

/// One decoded server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`None` means the default `message`).
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id, if present.
    pub id: Option<String>,
    /// Reconnection time in milliseconds, if present.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Creates a named event with data.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Self::default()
        }
    }

    /// The liveness ping event.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(PING_EVENT, json!({ "type": "ping" }).to_string())
    }

    /// A structured error report.
    ///
    /// Data is `{"type":"error","error":{"type":KIND,"message":MSG}}` with
    /// keys in that order.
    #[must_use]
    pub fn error(kind: &str, message: &str) -> Self {
        let report = ErrorReport {
            kind: ERROR_EVENT,
            error: ErrorDetail { kind, message },
        };
        Self::new(ERROR_EVENT, serde_json::to_string(&report).unwrap_or_default())
    }

    /// Returns the event name, defaulting to `message`.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// Returns `true` for ping frames.
    #[inline]
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.event_name() == PING_EVENT
    }

    /// Returns `true` for error frames.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event_name() == ERROR_EVENT
    }

    /// Returns `true` for the end-of-message frame.
    #[inline]
    #[must_use]
    pub fn is_message_stop(&self) -> bool {
        self.event_name() == MESSAGE_STOP_EVENT
    }

    /// Parses the data field as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the data is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.data)?)
    }

    /// Converts an error event into [`Error::Remote`].
    ///
    /// Accepts both `{"error":{"type":..,"message":..}}` and the flat
    /// `{"error":"..","message":".."}` shape. Non-JSON data becomes the
    /// message with kind `unknown`.
    #[must_use]
    pub fn to_remote_error(&self) -> Error {
        let Ok(value) = serde_json::from_str::<Value>(&self.data) else {
            return Error::remote("unknown", self.data.clone());
        };

        let nested = value.get("error");
        let kind = nested
            .and_then(|e| e.get("type"))
            .or(nested.filter(|e| e.is_string()))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let message = nested
            .and_then(|e| e.get("message"))
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(&self.data);

        Error::remote(kind, message)
    }

    /// Encodes the event in wire format, terminated by a blank line.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(retry) = self.retry {
            out.push_str(&format!("retry: {retry}\n"));
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out.into_bytes()
    }
}

/// Encoded ping frame.
#[inline]
#[must_use]
pub fn ping_frame() -> Vec<u8> {
    SseEvent::ping().encode()
}

/// Encoded error frame.
#[inline]
#[must_use]
pub fn error_frame(kind: &str, message: &str) -> Vec<u8> {
    SseEvent::error(kind, message).encode()
}

// ============================================================================
// SseDecoder
// ============================================================================

/// Incremental event-stream decoder.
///
/// Bytes may be pushed in chunks of any size; partial lines are buffered
/// until their terminator arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current unterminated line.
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let line = String::from_utf8_lossy(&line);
                if let Some(event) = self.decode_line(&line) {
                    events.push(event);
                }
            } else {
                self.line.push(byte);
            }
        }

        events
    }

    /// Returns `true` if no partial event is buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.line.is_empty()
            && self.event.is_none()
            && self.data.is_empty()
            && self.id.is_none()
            && self.retry.is_none()
    }

    fn decode_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.is_idle() {
                return None;
            }
            return Some(SseEvent {
                event: self.event.take(),
                data: std::mem::take(&mut self.data).join("\n"),
                id: self.id.take(),
                retry: self.retry.take(),
            });
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.retry = Some(retry);
                }
            }
            _ => {}
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================
