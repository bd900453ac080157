//! Autopsy
//!
//! In-process debug recording for Rust programs: record values, counters,
//! histogram samples, timeline events and occurrences at call sites, query
//! the call stack without forcing a capture, and export the result as a
//! self-describing report.
//!
//! This crate provides the core implementation for the `autopsy` CLI tool.
//!
//! ## Getting Started
//!
//! ```ignore
//! fn checkout(total: f64) {
//!     autopsy::scope!();
//!     autopsy::bind!(total);
//!     autopsy::hist!(total);
//!
//!     let caller = autopsy::call_stack!().caller().function_name();
//!     autopsy::log!("checkout", total, caller.value_or("unknown".to_string()));
//! }
//!
//! autopsy::report::recorder().write_report("autopsy_report.json")?;
//! ```
//!
//! Reports are inspected with the CLI:
//!
//! ```bash
//! autopsy validate --file autopsy_report.json
//! autopsy correlate --old before.json --new after.json --mark retry=12
//! ```

pub mod aggregator;
pub mod commands;
pub mod correlate;
pub mod evaluate;
pub mod live;
pub mod output;
pub mod query;
pub mod report;
pub mod stack;
pub mod utils;
pub mod value;

pub use query::{CallStack, ErrorInfo, QueryResult};
pub use report::{recorder, ReportStore};
pub use value::Value;
