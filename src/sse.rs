//! Frame decoding for event-stream and newline-delimited JSON bodies.
//!
//! Upstreams are inconsistent about framing. Some emit Server-Sent Events:
//! ```text
//! data: {"choices": [...]}
//!
//! data: [DONE]
//! ```
//! others emit one bare JSON object per line. [`decode_line`] accepts both and
//! turns every significant line into a [`Frame`]. A line that fails to parse
//! is dropped: one bad frame never takes the stream down with it.

use serde_json::Value;

/// One decoded logical unit of an upstream stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The `[DONE]` sentinel marking the logical end of the stream.
    Done,
    /// A JSON object carrying an `error` field.
    Error(String),
    /// Any other JSON object.
    Object(Value),
}

impl Frame {
    /// True for frames after which no further output is produced.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error(_))
    }
}

/// Decode one line into a frame.
///
/// Returns `None` for blank lines, SSE fields other than `data`, comments,
/// and anything that is not a JSON object.
///
/// # Example
/// ```
/// use ollachat::sse::{decode_line, Frame};
///
/// assert_eq!(decode_line("data: [DONE]"), Some(Frame::Done));
/// assert!(matches!(decode_line("{\"status\":\"success\"}"), Some(Frame::Object(_))));
/// assert_eq!(decode_line("data: {oops"), None);
/// assert_eq!(decode_line("   "), None);
/// ```
pub fn decode_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() || is_ignored_field(line) {
        return None;
    }

    let payload = parse_sse_line(line).unwrap_or(line);
    if is_done_marker(payload) {
        return Some(Frame::Done);
    }
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) if value.is_object() => Some(match error_message(&value) {
            Some(message) => Frame::Error(message),
            None => Frame::Object(value),
        }),
        Ok(_) => {
            tracing::debug!("Dropping non-object frame: {}", payload);
            None
        }
        Err(e) => {
            tracing::debug!("Dropping malformed frame ({}): {}", e, payload);
            None
        }
    }
}

/// Parse an SSE line to extract the data portion.
///
/// Both `data: <content>` and `data:<content>` are accepted.
///
/// # Example
/// ```
/// use ollachat::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|s| s.trim())
}

/// Check if an SSE data line indicates the stream is done.
///
/// # Example
/// ```
/// use ollachat::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

fn is_ignored_field(line: &str) -> bool {
    line.starts_with(':')
        || line.starts_with("event:")
        || line.starts_with("id:")
        || line.starts_with("retry:")
}

/// Extract the message of a top-level `error` field.
///
/// Ollama reports `{"error": "..."}`, OpenAI-style servers nest it as
/// `{"error": {"message": "..."}}`.
fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    match error {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(fields) => Some(
            fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => Some(other.to_string()),
    }
}
