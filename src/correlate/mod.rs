//! Correlation of entries across report regenerations.
//!
//! Log indices shift whenever a report is regenerated. Signatures identify an
//! entry by its content and stack shape instead, so annotations made on one
//! report can be carried over to the next.

pub mod reattach;
pub mod signature;

// Re-export main types and functions
pub use reattach::{reattach, Mark, Reattachment};
pub use signature::{find_by_signature, signature, Signature};
