//! Dashboard aggregates and the folds that build them.
//!
//! Each dashboard kind has one fold. [`fold_into`] applies a single value
//! group (live mode); [`reduce`] builds the whole dashboard from a sequence
//! (batch mode). Both paths must produce identical state for the same input,
//! which the tests and the property tests in `tests/` check.
//!
//! Folds never fail: payloads are checked with [`validate`] at the append
//! boundary before anything is folded.

use crate::report::model::{CallSiteKey, DashboardPayload, EntryRef, ValueGroup};
use crate::utils::error::ReportError;
use crate::value::Value;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Occurrences of one distinct value at a count site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: Value,
    pub count: u64,
    /// Originating entries in arrival order
    pub refs: Vec<EntryRef>,
}

/// Per-site counts, keyed by the canonical key of the counted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEntry {
    pub call_site: CallSiteKey,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    pub values: BTreeMap<String, ValueCount>,
}

impl CountEntry {
    /// Total observations folded into this entry
    pub fn total(&self) -> u64 {
        self.values.values().map(|v| v.count).sum()
    }

    /// Look up the tally for a value
    pub fn get(&self, value: &Value) -> Option<&ValueCount> {
        self.values.get(&value.canonical_key())
    }
}

/// One histogram observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistogramSample {
    #[serde(with = "crate::value::float")]
    pub value: f64,
    pub reference: EntryRef,
}

impl PartialEq for HistogramSample {
    fn eq(&self, other: &Self) -> bool {
        // Raw values are kept, NaN included, so compare by bits
        self.value.to_bits() == other.value.to_bits() && self.reference == other.reference
    }
}

/// Per-site histogram samples in arrival order; binning happens at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramEntry {
    pub call_site: CallSiteKey,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    pub samples: Vec<HistogramSample>,
}

impl HistogramEntry {
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

/// One timeline event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: f64,
    pub event_name: String,
    pub call_site: CallSiteKey,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    pub reference: EntryRef,
}

/// Per-site occurrence counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HappenedEntry {
    pub call_site: CallSiteKey,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,
    pub count: u64,
    pub refs: Vec<EntryRef>,
    /// Most recently supplied message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// All dashboard aggregates of a report
///
/// **Public** - derived state, always reconstructible from the value groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default, with = "keyed")]
    pub counts: BTreeMap<CallSiteKey, CountEntry>,

    #[serde(default, with = "keyed")]
    pub histograms: BTreeMap<CallSiteKey, HistogramEntry>,

    /// Ordered by timestamp; ties keep arrival order
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,

    #[serde(default, with = "keyed")]
    pub happened: BTreeMap<CallSiteKey, HappenedEntry>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
            && self.histograms.is_empty()
            && self.timeline.is_empty()
            && self.happened.is_empty()
    }

    /// Number of observations folded in, across all kinds
    pub fn observation_count(&self) -> u64 {
        let counts: u64 = self.counts.values().map(CountEntry::total).sum();
        let samples: usize = self.histograms.values().map(|h| h.samples.len()).sum();
        let happened: u64 = self.happened.values().map(|h| h.count).sum();
        counts + samples as u64 + self.timeline.len() as u64 + happened
    }
}

/// Check a payload before it is appended
///
/// # Errors
/// * `ReportError::InvalidPayload` - empty timeline event name or a
///   non-finite timeline timestamp
pub fn validate(payload: &DashboardPayload) -> Result<(), ReportError> {
    match payload {
        DashboardPayload::Timeline {
            event_name,
            timestamp,
        } => {
            if event_name.trim().is_empty() {
                return Err(ReportError::InvalidPayload(
                    "timeline event name cannot be empty".to_string(),
                ));
            }
            if !timestamp.is_finite() {
                return Err(ReportError::InvalidPayload(format!(
                    "timeline timestamp must be finite, got {}",
                    timestamp
                )));
            }
            Ok(())
        }
        DashboardPayload::Count { .. }
        | DashboardPayload::Histogram { .. }
        | DashboardPayload::Occurrence { .. } => Ok(()),
    }
}

/// Fold one value group into a dashboard, returning the new state
///
/// Plain (non-dashboard) groups leave the dashboard unchanged.
pub fn fold(mut dashboard: Dashboard, site: &CallSiteKey, group: &ValueGroup) -> Dashboard {
    fold_into(&mut dashboard, site, group);
    dashboard
}

/// In-place form of [`fold`], used by the store on every append
pub fn fold_into(dashboard: &mut Dashboard, site: &CallSiteKey, group: &ValueGroup) {
    apply(dashboard, site, group);

    if let Some(DashboardPayload::Timeline { timestamp, .. }) = &group.dashboard {
        // The event was pushed last; move it after every event with an equal
        // or earlier timestamp
        if let Some(event) = dashboard.timeline.pop() {
            let position = dashboard
                .timeline
                .partition_point(|e| e.timestamp.total_cmp(timestamp) != Ordering::Greater);
            dashboard.timeline.insert(position, event);
        }
    }
}

/// Build a dashboard from a whole sequence of value groups in arrival order
///
/// **Public** - batch path
pub fn reduce<'a, I>(groups: I) -> Dashboard
where
    I: IntoIterator<Item = (&'a CallSiteKey, &'a ValueGroup)>,
{
    let mut dashboard = Dashboard::new();
    let mut folded = 0usize;

    for (site, group) in groups {
        apply(&mut dashboard, site, group);
        folded += 1;
    }

    // Stable sort keeps arrival order among equal timestamps
    dashboard
        .timeline
        .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    debug!("Reduced {} value groups into dashboard", folded);
    dashboard
}

/// Per-kind updates; timeline events are appended and ordered by the caller
fn apply(dashboard: &mut Dashboard, site: &CallSiteKey, group: &ValueGroup) {
    let Some(payload) = &group.dashboard else {
        return;
    };
    let reference = group.entry_ref();

    match payload {
        DashboardPayload::Count { value } => fold_count(dashboard, site, group, value, reference),
        DashboardPayload::Histogram { value } => {
            dashboard
                .histograms
                .entry(site.clone())
                .or_insert_with(|| HistogramEntry {
                    call_site: site.clone(),
                    function_name: group.function_name.clone(),
                    enclosing_type_name: group.enclosing_type_name.clone(),
                    samples: Vec::new(),
                })
                .samples
                .push(HistogramSample {
                    value: *value,
                    reference,
                });
        }
        DashboardPayload::Timeline {
            event_name,
            timestamp,
        } => dashboard.timeline.push(TimelineEntry {
            timestamp: *timestamp,
            event_name: event_name.clone(),
            call_site: site.clone(),
            function_name: group.function_name.clone(),
            enclosing_type_name: group.enclosing_type_name.clone(),
            reference,
        }),
        DashboardPayload::Occurrence { message } => {
            let entry = dashboard
                .happened
                .entry(site.clone())
                .or_insert_with(|| HappenedEntry {
                    call_site: site.clone(),
                    function_name: group.function_name.clone(),
                    enclosing_type_name: group.enclosing_type_name.clone(),
                    count: 0,
                    refs: Vec::new(),
                    message: None,
                });
            entry.count += 1;
            entry.refs.push(reference);
            if message.is_some() {
                entry.message = message.clone();
            }
        }
    }
}

fn fold_count(
    dashboard: &mut Dashboard,
    site: &CallSiteKey,
    group: &ValueGroup,
    value: &Value,
    reference: EntryRef,
) {
    let entry = dashboard
        .counts
        .entry(site.clone())
        .or_insert_with(|| CountEntry {
            call_site: site.clone(),
            function_name: group.function_name.clone(),
            enclosing_type_name: group.enclosing_type_name.clone(),
            values: BTreeMap::new(),
        });

    let tally = entry
        .values
        .entry(value.canonical_key())
        .or_insert_with(|| ValueCount {
            value: value.clone(),
            count: 0,
            refs: Vec::new(),
        });
    tally.count += 1;
    tally.refs.push(reference);
}

/// Serialize site-keyed maps as a list of entries; each entry carries its
/// own `call_site`, which rebuilds the key on the way back
mod keyed {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub trait Keyed {
        fn site(&self) -> &CallSiteKey;
    }

    impl Keyed for CountEntry {
        fn site(&self) -> &CallSiteKey {
            &self.call_site
        }
    }

    impl Keyed for HistogramEntry {
        fn site(&self) -> &CallSiteKey {
            &self.call_site
        }
    }

    impl Keyed for HappenedEntry {
        fn site(&self) -> &CallSiteKey {
            &self.call_site
        }
    }

    pub fn serialize<S, T>(map: &BTreeMap<CallSiteKey, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<CallSiteKey, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Keyed,
    {
        let entries = Vec::<T>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.site().clone(), entry))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackTraceId;
    use pretty_assertions::assert_eq;

    fn site(line: u32) -> CallSiteKey {
        CallSiteKey::new("src/orders.rs", line)
    }

    fn group(log_index: u64, payload: DashboardPayload) -> ValueGroup {
        ValueGroup {
            log_index,
            function_name: "process".to_string(),
            enclosing_type_name: None,
            name: None,
            values: Vec::new(),
            stack_trace_id: Some(StackTraceId(log_index)),
            dashboard: Some(payload),
        }
    }

    fn count(log_index: u64, value: i64) -> ValueGroup {
        group(log_index, DashboardPayload::Count { value: Value::Int(value) })
    }

    fn event(log_index: u64, name: &str, timestamp: f64) -> ValueGroup {
        group(
            log_index,
            DashboardPayload::Timeline {
                event_name: name.to_string(),
                timestamp,
            },
        )
    }

    #[test]
    fn test_count_fold() {
        let s = site(10);
        let mut dashboard = Dashboard::new();
        for (i, v) in [1, 2, 1, 3, 1].into_iter().enumerate() {
            fold_into(&mut dashboard, &s, &count(i as u64, v));
        }

        let entry = &dashboard.counts[&s];
        let ones = entry.get(&Value::Int(1)).unwrap();
        assert_eq!(ones.count, 3);
        assert_eq!(
            ones.refs.iter().map(|r| r.log_index).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );
        assert_eq!(entry.values["2"].count, 1);
        assert_eq!(entry.values["3"].count, 1);
        assert_eq!(entry.total(), 5);
    }

    #[test]
    fn test_count_keys_are_structural() {
        let s = site(10);
        let a = group(0, DashboardPayload::Count {
            value: Value::map([("x", Value::Int(1)), ("y", Value::Int(2))]),
        });
        let b = group(1, DashboardPayload::Count {
            value: Value::map([("y", Value::Int(2)), ("x", Value::Int(1))]),
        });

        let dashboard = reduce([(&s, &a), (&s, &b)]);
        assert_eq!(dashboard.counts[&s].values.len(), 1);
        assert_eq!(dashboard.counts[&s].total(), 2);
    }

    #[test]
    fn test_occurrence_message_last_write_wins() {
        let s = site(20);
        let messages = [Some("a"), None, Some("b")];
        let mut dashboard = Dashboard::new();
        for (i, message) in messages.into_iter().enumerate() {
            let g = group(i as u64, DashboardPayload::Occurrence {
                message: message.map(str::to_string),
            });
            dashboard = fold(dashboard, &s, &g);
        }

        let entry = &dashboard.happened[&s];
        assert_eq!(entry.message.as_deref(), Some("b"));
        assert_eq!(entry.count, 3);
        assert_eq!(entry.refs.len(), 3);
    }

    #[test]
    fn test_histogram_keeps_raw_values() {
        let s = site(30);
        let values = [1.5, f64::NAN, f64::INFINITY, -2.0];
        let groups: Vec<ValueGroup> = values
            .iter()
            .enumerate()
            .map(|(i, v)| group(i as u64, DashboardPayload::Histogram { value: *v }))
            .collect();

        let dashboard = reduce(groups.iter().map(|g| (&s, g)));
        let stored = dashboard.histograms[&s].values();
        assert_eq!(stored.len(), 4);
        assert!(stored[1].is_nan());
        assert_eq!(stored[2], f64::INFINITY);
    }

    #[test]
    fn test_timeline_orders_by_timestamp_under_skew() {
        let s = site(40);
        let groups = [
            event(0, "start", 10.0),
            event(1, "late-clock", 5.0),
            event(2, "tie-a", 7.0),
            event(3, "tie-b", 7.0),
            event(4, "end", 12.0),
        ];

        let mut incremental = Dashboard::new();
        for g in &groups {
            fold_into(&mut incremental, &s, g);
        }
        let batch = reduce(groups.iter().map(|g| (&s, g)));

        let names: Vec<&str> = batch.timeline.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["late-clock", "tie-a", "tie-b", "start", "end"]);
        assert_eq!(incremental, batch);
    }

    #[test]
    fn test_plain_groups_are_ignored() {
        let s = site(50);
        let mut plain = count(0, 1);
        plain.dashboard = None;
        let dashboard = fold(Dashboard::new(), &s, &plain);
        assert!(dashboard.is_empty());
    }

    #[test]
    fn test_validate_timeline() {
        assert!(validate(&DashboardPayload::Timeline {
            event_name: "  ".to_string(),
            timestamp: 1.0,
        })
        .is_err());
        assert!(validate(&DashboardPayload::Timeline {
            event_name: "tick".to_string(),
            timestamp: f64::NAN,
        })
        .is_err());
        assert!(validate(&DashboardPayload::Histogram { value: f64::NAN }).is_ok());
    }

    #[test]
    fn test_dashboard_json_round_trip() {
        let s = site(60);
        let groups = [
            count(0, 1),
            group(1, DashboardPayload::Histogram { value: f64::NEG_INFINITY }),
            event(2, "go", 1.0),
            group(3, DashboardPayload::Occurrence { message: Some("hit".to_string()) }),
        ];
        let dashboard = reduce(groups.iter().map(|g| (&s, g)));

        let json = serde_json::to_string(&dashboard).unwrap();
        let back: Dashboard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dashboard);
        assert_eq!(back.observation_count(), 4);
    }
}
