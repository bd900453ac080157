//! Live mode: incremental report updates over a transport.
//!
//! A transport (socket, pipe, file) delivers [`LiveMessage`]s in arrival
//! order; a [`LiveSession`] applies them to its store exactly once and
//! publishes whole batches to concurrent readers.

pub mod message;
pub mod session;

// Re-export main types and functions
pub use message::{decode_message, encode_message, LiveMessage, TransportEvent};
pub use session::{feed_lines, LiveSender, LiveSession, SessionEvent};
