//! Recorded observations as JSON lines.
//!
//! Processes that cannot link the recorder directly write one observation
//! per line; the `build` command appends them to a store in file order.
//!
//! ```text
//! {"kind":"log","filename":"src/cart.rs","line":12,"function_name":"add","values":[{"name":"qty","value":2}]}
//! {"kind":"count","filename":"src/cart.rs","line":20,"function_name":"add","value":"book"}
//! {"kind":"hist","filename":"src/cart.rs","line":21,"function_name":"add","value":"NaN"}
//! {"kind":"timeline","filename":"src/cart.rs","line":30,"function_name":"pay","event_name":"paid","timestamp":1700000000.5}
//! {"kind":"happened","filename":"src/cart.rs","line":31,"function_name":"pay","message":"retry"}
//! ```

use super::model::{CallSiteKey, DashboardPayload, NamedValue, NewEntry, TraceLink};
use super::store::ReportStore;
use crate::stack::{StackTrace, StackTraceId};
use crate::utils::error::ReportError;
use crate::value::{float, Value};
use log::{debug, warn};
use serde::Deserialize;

/// One line of observation input
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    pub filename: String,
    pub line: u32,
    pub function_name: String,
    #[serde(default)]
    pub enclosing_type_name: Option<String>,
    /// Freshly captured trace for this entry
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
    /// Link to a trace recorded with an earlier entry
    #[serde(default)]
    pub stack_trace_id: Option<StackTraceId>,
    #[serde(flatten)]
    pub kind: ObservationKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationKind {
    Log {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        values: Vec<NamedValue>,
    },
    Count {
        value: Value,
    },
    #[serde(alias = "histogram")]
    Hist {
        value: Value,
    },
    Timeline {
        event_name: String,
        timestamp: f64,
    },
    #[serde(alias = "occurrence")]
    Happened {
        #[serde(default)]
        message: Option<String>,
    },
}

impl Observation {
    /// Split into the call site and the entry to append
    ///
    /// # Errors
    /// * `ReportError::InvalidPayload` - non-numeric histogram value, or both
    ///   a trace and a trace id given
    pub fn into_entry(self) -> Result<(CallSiteKey, NewEntry), ReportError> {
        let site = CallSiteKey::new(self.filename, self.line);

        let mut entry = match self.kind {
            ObservationKind::Log { name, values } => {
                let mut entry = NewEntry::values(self.function_name, values);
                entry.name = name;
                entry
            }
            ObservationKind::Count { value } => NewEntry::count(self.function_name, value),
            ObservationKind::Hist { value } => {
                NewEntry::histogram(self.function_name, histogram_value(&value)?)
            }
            ObservationKind::Timeline {
                event_name,
                timestamp,
            } => NewEntry::dashboard(
                self.function_name,
                DashboardPayload::Timeline {
                    event_name,
                    timestamp,
                },
            ),
            ObservationKind::Happened { message } => {
                NewEntry::dashboard(self.function_name, DashboardPayload::Occurrence { message })
            }
        };
        entry.enclosing_type_name = self.enclosing_type_name;

        entry.stack_trace = match (self.stack_trace, self.stack_trace_id) {
            (Some(_), Some(_)) => {
                return Err(ReportError::InvalidPayload(
                    "give either stack_trace or stack_trace_id, not both".to_string(),
                ))
            }
            (Some(trace), None) => Some(TraceLink::Attached(trace)),
            (None, Some(id)) => Some(TraceLink::Shared(id)),
            (None, None) => None,
        };

        Ok((site, entry))
    }
}

/// Numeric view of a histogram value; non-finite labels are accepted
fn histogram_value(value: &Value) -> Result<f64, ReportError> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(float::parse_label))
        .ok_or_else(|| {
            ReportError::InvalidPayload(format!(
                "histogram value must be a number, got {}",
                value.type_name()
            ))
        })
}

/// Result of loading observations into a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStats {
    pub appended: usize,
    /// (1-based line number, reason)
    pub rejected: Vec<(usize, String)>,
}

/// Append every observation in `input` to `store`
///
/// Blank lines are ignored. A line that does not parse, or that the store
/// rejects, is reported in the stats and skipped; later lines still load.
pub fn load_observations(store: &mut ReportStore, input: &str) -> LoadStats {
    let mut stats = LoadStats::default();

    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = serde_json::from_str::<Observation>(line)
            .map_err(|e| e.to_string())
            .and_then(|obs| obs.into_entry().map_err(|e| e.to_string()))
            .and_then(|(site, entry)| store.append(site, entry).map_err(|e| e.to_string()));

        match outcome {
            Ok(log_index) => {
                debug!("Line {} appended as entry {}", line_no, log_index);
                stats.appended += 1;
            }
            Err(reason) => {
                warn!("Skipping observation on line {}: {}", line_no, reason);
                stats.rejected.push((line_no, reason));
            }
        }
    }

    stats
}
