//! Read-time statistics over dashboard aggregates.
//!
//! Nothing here is stored in the report; these are summaries computed on
//! demand for the CLI and for logging.

use super::fold::{CountEntry, HistogramEntry, ValueCount};
use log::debug;

/// A frequently counted value
///
/// **Public** - returned from calculate_hot_values
#[derive(Debug, Clone, PartialEq)]
pub struct HotValue {
    /// Canonical key of the value
    pub key: String,

    /// Number of observations with this value
    pub count: u64,

    /// Share of all observations at the site
    pub percentage: f64,
}

/// Most frequent values at a count site
///
/// **Public** - main entry point for count metrics
///
/// # Arguments
/// * `entry` - Count aggregate of one call site
/// * `top_n` - Number of values to return
///
/// # Returns
/// Hot values sorted by count (descending), ties by key
pub fn calculate_hot_values(entry: &CountEntry, top_n: usize) -> Vec<HotValue> {
    let total = entry.total();
    debug!(
        "Calculating top {} values from {} distinct values at {}",
        top_n,
        entry.values.len(),
        entry.call_site
    );

    let mut values: Vec<(&String, &ValueCount)> = entry.values.iter().collect();
    values.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));

    values
        .into_iter()
        .take(top_n)
        .map(|(key, tally)| create_hot_value(key, tally, total))
        .collect()
}

/// Create a HotValue from a tally
///
/// **Private** - internal conversion
fn create_hot_value(key: &str, tally: &ValueCount, total: u64) -> HotValue {
    let percentage = if total > 0 {
        (tally.count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    HotValue {
        key: key.to_string(),
        count: tally.count,
        percentage,
    }
}

/// Calculate summary statistics for a histogram
///
/// **Public** - provides summary statistics
///
/// Non-finite samples are tallied separately and excluded from min, max,
/// mean and median.
pub fn calculate_histogram_summary(entry: &HistogramEntry) -> HistogramSummary {
    let mut summary = HistogramSummary {
        count: entry.samples.len(),
        ..HistogramSummary::default()
    };

    let mut finite: Vec<f64> = Vec::with_capacity(entry.samples.len());
    for sample in &entry.samples {
        let v = sample.value;
        if v.is_nan() {
            summary.nan_count += 1;
        } else if v == f64::INFINITY {
            summary.pos_inf_count += 1;
        } else if v == f64::NEG_INFINITY {
            summary.neg_inf_count += 1;
        } else {
            finite.push(v);
        }
    }

    if finite.is_empty() {
        return summary;
    }

    finite.sort_by(|a, b| a.total_cmp(b));
    let sum: f64 = finite.iter().sum();

    summary.finite_count = finite.len();
    summary.min = finite.first().copied();
    summary.max = finite.last().copied();
    summary.mean = Some(sum / finite.len() as f64);
    summary.median = Some(if finite.len() % 2 == 0 {
        let mid = finite.len() / 2;
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[finite.len() / 2]
    });

    summary
}

/// Histogram summary statistics
///
/// **Public** - returned from calculate_histogram_summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSummary {
    /// All samples, finite or not
    pub count: usize,

    pub finite_count: usize,
    pub nan_count: usize,
    pub pos_inf_count: usize,
    pub neg_inf_count: usize,

    /// Statistics over finite samples; `None` when there are none
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

impl HistogramSummary {
    pub fn has_special_values(&self) -> bool {
        self.nan_count + self.pos_inf_count + self.neg_inf_count > 0
    }

    /// Get human-readable summary
    ///
    /// **Public** - for logging and the CLI
    pub fn summary(&self) -> String {
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v));
        let mut line = format!(
            "Samples: {} | Min: {} | Max: {} | Mean: {} | Median: {}",
            self.count,
            fmt(self.min),
            fmt(self.max),
            fmt(self.mean),
            fmt(self.median)
        );
        if self.has_special_values() {
            line.push_str(&format!(
                " | NaN: {} | +Inf: {} | -Inf: {}",
                self.nan_count, self.pos_inf_count, self.neg_inf_count
            ));
        }
        line
    }
}
