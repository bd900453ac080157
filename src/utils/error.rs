//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! Stack query misses are not errors in this sense: they are carried by
//! `QueryResult` failures and never surface here.

use thiserror::Error;

/// Errors raised at the report append boundary.
///
/// Every variant is produced before the store is touched, so a rejected
/// append leaves call sites, aggregates and the log index unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("Invalid call site: {0}")]
    InvalidCallSite(String),

    #[error("Invalid dashboard payload: {0}")]
    InvalidPayload(String),

    #[error("Call site {filename}:{line} mixes dashboard and plain entries")]
    SiteKindMismatch { filename: String, line: u32 },

    #[error("Unknown stack trace id: {0}")]
    UnknownStackTrace(u64),

    #[error("Entry out of sequence: expected log index {expected}, got {got}")]
    OutOfSequence { expected: u64, got: u64 },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Faults reported by a live transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Malformed transport message: {0}")]
    Malformed(String),

    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    #[error("Failed to start live session: {0}")]
    Spawn(String),
}
