//! Content-derived entry signatures.

use crate::report::{CallSiteKey, DashboardPayload, ReportStore, ValueGroup};
use crate::stack::StackTrace;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a recorded entry that survives report regeneration
///
/// `digest` covers the entry's content and stack shape; `occurrence` counts
/// the earlier entries at the same call site with the same digest, so that
/// repeated identical entries stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub call_site: CallSiteKey,
    pub digest: String,
    pub occurrence: usize,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}#{}@{}", short, self.occurrence, self.call_site)
    }
}

/// Signature of the entry with `log_index`
///
/// # Returns
/// `None` if the store has no such entry
pub fn signature(store: &ReportStore, log_index: u64) -> Option<Signature> {
    let (key, group) = store.value_group(log_index)?;
    let site = store.call_site(key)?;
    let digest = entry_digest(store, key, group);

    let occurrence = site
        .value_groups
        .iter()
        .take_while(|g| g.log_index != log_index)
        .filter(|g| entry_digest(store, key, g) == digest)
        .count();

    Some(Signature {
        call_site: key.clone(),
        digest,
        occurrence,
    })
}

/// Locate the entry matching `signature`
///
/// Scans the matching call site's entries in order and returns the
/// `occurrence`-th entry with the same digest.
///
/// # Returns
/// `None` when no entry has the same content and stack shape
pub fn find_by_signature(store: &ReportStore, signature: &Signature) -> Option<u64> {
    let site = store.call_site(&signature.call_site)?;
    site.value_groups
        .iter()
        .filter(|g| entry_digest(store, &signature.call_site, g) == signature.digest)
        .nth(signature.occurrence)
        .map(|g| g.log_index)
}

/// SHA-256 over everything that identifies an entry except its log index
fn entry_digest(store: &ReportStore, key: &CallSiteKey, group: &ValueGroup) -> String {
    let mut hasher = Sha256::new();

    field(&mut hasher, "site", &key.to_string());
    field(&mut hasher, "function", &group.function_name);
    field(&mut hasher, "type", group.enclosing_type_name.as_deref().unwrap_or(""));
    field(&mut hasher, "name", group.name.as_deref().unwrap_or(""));

    for named in &group.values {
        field(&mut hasher, "value_name", named.name.as_deref().unwrap_or(""));
        field(&mut hasher, "value", &named.value.canonical_key());
    }

    if let Some(payload) = &group.dashboard {
        field(&mut hasher, "kind", payload.kind().as_str());
        match payload {
            DashboardPayload::Count { value } => {
                field(&mut hasher, "payload", &value.canonical_key())
            }
            DashboardPayload::Histogram { value } => {
                field(&mut hasher, "payload", &Value::Float(*value).canonical_key())
            }
            // The timestamp differs between runs
            DashboardPayload::Timeline { event_name, .. } => {
                field(&mut hasher, "payload", event_name)
            }
            DashboardPayload::Occurrence { message } => {
                field(&mut hasher, "payload", message.as_deref().unwrap_or(""))
            }
        }
    }

    if let Some(trace) = group.stack_trace_id.and_then(|id| store.stack_trace(id)) {
        shape(&mut hasher, trace);
    }

    format!("{:x}", hasher.finalize())
}

fn shape(hasher: &mut Sha256, trace: &StackTrace) {
    for (filename, line, function) in trace.shape() {
        field(hasher, "frame", &format!("{}:{}:{}", filename, line, function));
    }
}

/// Length-prefixed so adjacent fields cannot run together
fn field(hasher: &mut Sha256, tag: &str, value: &str) {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{NamedValue, NewEntry};
    use crate::stack::StackFrame;

    fn key(line: u32) -> CallSiteKey {
        CallSiteKey::new("src/app.rs", line)
    }

    fn trace(line: u32) -> StackTrace {
        StackTrace::new(vec![
            StackFrame::new("src/app.rs", "step", line).with_variable("x", 1),
            StackFrame::new("src/main.rs", "main", 3),
        ])
    }

    #[test]
    fn test_signature_ignores_variable_contents_and_time() {
        let mut a = ReportStore::new();
        let mut b = ReportStore::new();

        a.append(key(10), NewEntry::values("step", vec![NamedValue::new(Some("x"), 1)]).with_trace(trace(10)))
            .unwrap();

        let mut other = trace(10);
        other.frames[0] = other.frames[0].clone().with_variable("x", 99);
        b.append(key(10), NewEntry::values("step", vec![NamedValue::new(Some("x"), 1)]).with_trace(other))
            .unwrap();

        assert_eq!(signature(&a, 0), signature(&b, 0));
    }

    #[test]
    fn test_signature_differs_by_stack_shape() {
        let mut store = ReportStore::new();
        store.append(key(10), NewEntry::count("step", 1).with_trace(trace(10))).unwrap();
        store.append(key(10), NewEntry::count("step", 1).with_trace(trace(11))).unwrap();

        let first = signature(&store, 0).unwrap();
        let second = signature(&store, 1).unwrap();
        assert_ne!(first.digest, second.digest);
        assert_eq!(second.occurrence, 0);
    }

    #[test]
    fn test_repeated_entries_get_ordinals() {
        let mut store = ReportStore::new();
        for _ in 0..3 {
            store.append(key(5), NewEntry::occurrence("loop", Some("tick"))).unwrap();
        }

        let third = signature(&store, 2).unwrap();
        assert_eq!(third.occurrence, 2);
        assert_eq!(find_by_signature(&store, &third), Some(2));
    }

    #[test]
    fn test_timeline_timestamp_excluded() {
        let mut a = ReportStore::new();
        let mut b = ReportStore::new();
        a.append(key(7), NewEntry::timeline("run", "start", 1.0)).unwrap();
        b.append(key(7), NewEntry::timeline("run", "start", 2.5)).unwrap();
        assert_eq!(signature(&a, 0), signature(&b, 0));
    }

    #[test]
    fn test_not_found_is_clean() {
        let mut store = ReportStore::new();
        store.append(key(1), NewEntry::count("f", 1)).unwrap();
        let sig = signature(&store, 0).unwrap();

        let mut changed = ReportStore::new();
        changed.append(key(1), NewEntry::count("f", 2)).unwrap();
        assert_eq!(find_by_signature(&changed, &sig), None);
        assert_eq!(find_by_signature(&ReportStore::new(), &sig), None);
        assert_eq!(signature(&store, 5), None);
    }
}
