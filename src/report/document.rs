//! The export document: the hand-off artifact for files, live snapshots and
//! the presentation layer.

use super::model::CallSite;
use crate::aggregator::Dashboard;
use crate::stack::StackTrace;
use crate::utils::config::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Self-describing report document
///
/// **Public** - serialized by `output::json` and carried by live snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    /// Schema version
    pub version: String,

    /// RFC 3339 generation timestamp
    pub generated_at: String,

    /// Log index the next appended entry will receive
    pub next_log_index: u64,

    /// Call sites in order of first observation
    pub call_sites: Vec<CallSite>,

    /// Stack trace table keyed by the string form of the trace id
    #[serde(default)]
    pub stack_traces: BTreeMap<String, StackTrace>,

    /// Derived aggregates; recomputed from the value groups on import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<Dashboard>,
}

impl ReportDocument {
    /// Number of value groups across all call sites
    pub fn entry_count(&self) -> usize {
        self.call_sites.iter().map(|s| s.value_groups.len()).sum()
    }

    /// Whether the document's major schema version matches ours
    pub fn is_compatible(&self) -> bool {
        major(&self.version).is_some() && major(&self.version) == major(SCHEMA_VERSION)
    }
}

fn major(version: &str) -> Option<&str> {
    version.split('.').next().filter(|m| !m.is_empty())
}
