//! Aggregation of recorded observations into dashboard structures.
//!
//! This module turns value groups into:
//! - Count tallies per distinct value
//! - Raw histogram samples
//! - A timestamp-ordered timeline
//! - Occurrence counters
//!
//! and computes read-time statistics over them.

pub mod fold;
pub mod metrics;

// Re-export main types and functions
pub use fold::{
    fold, fold_into, reduce, validate, CountEntry, Dashboard, HappenedEntry, HistogramEntry,
    HistogramSample, TimelineEntry, ValueCount,
};
pub use metrics::{calculate_histogram_summary, calculate_hot_values, HistogramSummary, HotValue};
