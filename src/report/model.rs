//! Report data model: call sites, value groups and dashboard payloads.

use crate::stack::{StackTrace, StackTraceId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteKey {
    pub filename: String,
    pub line: u32,
}

impl CallSiteKey {
    pub fn new(filename: impl Into<String>, line: u32) -> Self {
        Self {
            filename: filename.into(),
            line,
        }
    }
}

impl fmt::Display for CallSiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.line)
    }
}

/// The four dashboard observation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardKind {
    Count,
    Histogram,
    Timeline,
    Occurrence,
}

impl DashboardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardKind::Count => "count",
            DashboardKind::Histogram => "histogram",
            DashboardKind::Timeline => "timeline",
            DashboardKind::Occurrence => "occurrence",
        }
    }
}

/// Kind-specific payload of a dashboard observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardPayload {
    Count {
        value: Value,
    },
    Histogram {
        #[serde(with = "crate::value::float")]
        value: f64,
    },
    Timeline {
        event_name: String,
        /// Seconds since the Unix epoch
        timestamp: f64,
    },
    Occurrence {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Histogram samples compare bitwise so a NaN sample equals itself
impl PartialEq for DashboardPayload {
    fn eq(&self, other: &Self) -> bool {
        use DashboardPayload::*;
        match (self, other) {
            (Count { value: a }, Count { value: b }) => a == b,
            (Histogram { value: a }, Histogram { value: b }) => a.to_bits() == b.to_bits(),
            (
                Timeline {
                    event_name: a,
                    timestamp: ta,
                },
                Timeline {
                    event_name: b,
                    timestamp: tb,
                },
            ) => a == b && ta == tb,
            (Occurrence { message: a }, Occurrence { message: b }) => a == b,
            _ => false,
        }
    }
}

impl DashboardPayload {
    pub fn kind(&self) -> DashboardKind {
        match self {
            DashboardPayload::Count { .. } => DashboardKind::Count,
            DashboardPayload::Histogram { .. } => DashboardKind::Histogram,
            DashboardPayload::Timeline { .. } => DashboardKind::Timeline,
            DashboardPayload::Occurrence { .. } => DashboardKind::Occurrence,
        }
    }
}

/// One recorded value, with the expression it came from when known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Value,
}

impl NamedValue {
    pub fn new(name: Option<&str>, value: impl Into<Value>) -> Self {
        Self {
            name: name.map(str::to_string),
            value: value.into(),
        }
    }
}

/// Reference from an aggregate back to the entry it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub log_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace_id: Option<StackTraceId>,
}

/// One recorded observation at a call site
///
/// **Public** - never mutated once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueGroup {
    pub log_index: u64,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub values: Vec<NamedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace_id: Option<StackTraceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardPayload>,
}

impl ValueGroup {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            log_index: self.log_index,
            stack_trace_id: self.stack_trace_id,
        }
    }

    pub fn kind(&self) -> Option<DashboardKind> {
        self.dashboard.as_ref().map(DashboardPayload::kind)
    }
}

/// A (filename, line) location and everything recorded there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub filename: String,
    pub line: u32,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    #[serde(default)]
    pub is_dashboard: bool,
    #[serde(default)]
    pub value_groups: Vec<ValueGroup>,
}

impl CallSite {
    pub fn key(&self) -> CallSiteKey {
        CallSiteKey::new(self.filename.clone(), self.line)
    }
}

/// How a new entry links to a stack trace
#[derive(Debug, Clone, PartialEq)]
pub enum TraceLink {
    /// A freshly captured trace, stored under the entry's own log index
    Attached(StackTrace),
    /// A trace already in the store
    Shared(StackTraceId),
}

/// An observation about to be appended; the store assigns its log index
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub function_name: String,
    pub enclosing_type_name: Option<String>,
    pub name: Option<String>,
    pub values: Vec<NamedValue>,
    pub stack_trace: Option<TraceLink>,
    pub dashboard: Option<DashboardPayload>,
}

impl NewEntry {
    /// Plain entry with recorded values
    pub fn values(function_name: impl Into<String>, values: Vec<NamedValue>) -> Self {
        Self {
            function_name: function_name.into(),
            enclosing_type_name: None,
            name: None,
            values,
            stack_trace: None,
            dashboard: None,
        }
    }

    /// Dashboard entry
    pub fn dashboard(function_name: impl Into<String>, payload: DashboardPayload) -> Self {
        Self {
            dashboard: Some(payload),
            ..Self::values(function_name, Vec::new())
        }
    }

    pub fn count(function_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::dashboard(function_name, DashboardPayload::Count { value: value.into() })
    }

    pub fn histogram(function_name: impl Into<String>, value: f64) -> Self {
        Self::dashboard(function_name, DashboardPayload::Histogram { value })
    }

    pub fn timeline(function_name: impl Into<String>, event_name: impl Into<String>, timestamp: f64) -> Self {
        Self::dashboard(
            function_name,
            DashboardPayload::Timeline {
                event_name: event_name.into(),
                timestamp,
            },
        )
    }

    pub fn occurrence(function_name: impl Into<String>, message: Option<&str>) -> Self {
        Self::dashboard(
            function_name,
            DashboardPayload::Occurrence {
                message: message.map(str::to_string),
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.enclosing_type_name = Some(type_name.into());
        self
    }

    pub fn with_trace(mut self, trace: StackTrace) -> Self {
        self.stack_trace = Some(TraceLink::Attached(trace));
        self
    }

    pub fn with_shared_trace(mut self, id: StackTraceId) -> Self {
        self.stack_trace = Some(TraceLink::Shared(id));
        self
    }
}

/// One appended entry as it travels to a live reader: the value group, its
/// call site and the trace it introduced, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportUnit {
    pub call_site: CallSiteKey,
    pub value_group: ValueGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = DashboardPayload::Histogram { value: f64::INFINITY };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"kind":"histogram","value":"Infinity"}"#);

        let occurrence: DashboardPayload = serde_json::from_str(r#"{"kind":"occurrence"}"#).unwrap();
        assert_eq!(occurrence, DashboardPayload::Occurrence { message: None });
    }

    #[test]
    fn test_value_group_omits_empty_fields() {
        let group = ValueGroup {
            log_index: 3,
            function_name: "main".to_string(),
            enclosing_type_name: None,
            name: None,
            values: vec![NamedValue::new(Some("x"), 1)],
            stack_trace_id: None,
            dashboard: None,
        };
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(
            json,
            r#"{"log_index":3,"function_name":"main","values":[{"name":"x","value":1}]}"#
        );
    }

    #[test]
    fn test_new_entry_builders() {
        let entry = NewEntry::count("tally", "red")
            .with_type("Counter")
            .with_shared_trace(StackTraceId(2));
        assert_eq!(entry.dashboard.as_ref().map(DashboardPayload::kind), Some(DashboardKind::Count));
        assert_eq!(entry.enclosing_type_name.as_deref(), Some("Counter"));
        assert_eq!(entry.stack_trace, Some(TraceLink::Shared(StackTraceId(2))));
    }
}
