//! Live transport messages.
//!
//! Two shapes travel over a connection, one JSON object per line:
//!
//! ```text
//! {"type":"snapshot","data":{"version":"1.0.0","generated_at":"...","next_log_index":3,"call_sites":[...]}}
//! {"type":"unit","call_site":{"filename":"src/a.rs","line":4},"value_group":{...},"stack_trace":{...}}
//! ```

use crate::report::{ReportDocument, ReportUnit};
use crate::utils::error::TransportError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Full report state; replaces whatever the reader holds
    Snapshot { data: ReportDocument },

    /// Exactly one new entry, plus the trace it introduced
    Unit(ReportUnit),
}

/// What a transport delivers to a live session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(LiveMessage),
    Malformed(String),
    Disconnected { reason: String },
}

impl From<Result<LiveMessage, TransportError>> for TransportEvent {
    fn from(decoded: Result<LiveMessage, TransportError>) -> Self {
        match decoded {
            Ok(message) => TransportEvent::Message(message),
            Err(TransportError::Disconnected(reason)) => TransportEvent::Disconnected { reason },
            Err(e) => TransportEvent::Malformed(e.to_string()),
        }
    }
}

/// Decode one line of transport input
///
/// # Errors
/// * `TransportError::Malformed` - If the line is not a valid message
pub fn decode_message(line: &str) -> Result<LiveMessage, TransportError> {
    serde_json::from_str(line.trim()).map_err(|e| TransportError::Malformed(e.to_string()))
}

/// Encode a message as a single line, without the trailing newline
pub fn encode_message(message: &LiveMessage) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|e| TransportError::Malformed(e.to_string()))
}
