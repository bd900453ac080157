//! Output writers for report documents.
//!
//! This module handles writing reports to disk and to the terminal:
//! - JSON reports (pretty and compact)
//! - Reading reports back for validation and correlation
//! - Text summaries

pub mod json;
pub mod terminal;

// Re-export main functions
pub use json::{read_report, report_to_string, write_report, write_report_compact};
pub use terminal::{render_reattachments, render_report_summary};
