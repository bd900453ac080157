//! Re-attaching annotations to a regenerated report.

use super::signature::{find_by_signature, signature, Signature};
use crate::report::ReportStore;
use log::debug;
use serde::{Deserialize, Serialize};

/// An annotation held outside the report, pointing at one entry
///
/// Saved range boundaries are stored as a pair of marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub label: String,
    pub log_index: u64,
}

impl Mark {
    pub fn new(label: impl Into<String>, log_index: u64) -> Self {
        Self {
            label: label.into(),
            log_index,
        }
    }
}

/// Where a mark landed in the new report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reattachment {
    pub label: String,
    pub old_index: u64,
    /// `None` if the entry is gone from the new report
    pub new_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Reattachment {
    pub fn is_found(&self) -> bool {
        self.new_index.is_some()
    }
}

/// Re-locate every mark from `old` in `new`
///
/// A mark whose entry no longer exists in `old`, or has no structural match
/// in `new`, comes back with `new_index: None`.
pub fn reattach(old: &ReportStore, new: &ReportStore, marks: &[Mark]) -> Vec<Reattachment> {
    marks
        .iter()
        .map(|mark| {
            let signature = signature(old, mark.log_index);
            let new_index = signature.as_ref().and_then(|s| find_by_signature(new, s));
            debug!(
                "Mark '{}': {} -> {:?}",
                mark.label, mark.log_index, new_index
            );
            Reattachment {
                label: mark.label.clone(),
                old_index: mark.log_index,
                new_index,
                signature,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CallSiteKey, NewEntry};

    fn key(line: u32) -> CallSiteKey {
        CallSiteKey::new("src/job.rs", line)
    }

    #[test]
    fn test_reattach_after_insertions() {
        let mut old = ReportStore::new();
        old.append(key(1), NewEntry::count("run", "a")).unwrap();
        old.append(key(2), NewEntry::occurrence("run", Some("retry"))).unwrap();
        old.append(key(2), NewEntry::occurrence("run", Some("retry"))).unwrap();

        let mut new = ReportStore::new();
        new.append(key(9), NewEntry::count("setup", 0)).unwrap();
        new.append(key(2), NewEntry::occurrence("run", Some("retry"))).unwrap();
        new.append(key(9), NewEntry::count("setup", 1)).unwrap();
        new.append(key(2), NewEntry::occurrence("run", Some("retry"))).unwrap();

        let marks = vec![
            Mark::new("second retry", 2),
            Mark::new("first count", 0),
            Mark::new("stale", 40),
        ];
        let result = reattach(&old, &new, &marks);

        assert_eq!(result[0].new_index, Some(3));
        assert_eq!(result[1].new_index, None);
        assert!(result[1].signature.is_some());
        assert!(!result[2].is_found());
        assert!(result[2].signature.is_none());
    }
}
