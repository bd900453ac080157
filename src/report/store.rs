//! The append-only report store.
//!
//! Owns the call sites, their value groups, the stack trace table, the
//! dashboard aggregates and the log index counter. The counter is advanced
//! only by a successful append, so log indices are unique and strictly
//! increasing in append order.
//!
//! Every append is validated completely before anything is mutated: a
//! rejected entry leaves the store exactly as it was.

use super::document::ReportDocument;
use super::model::{CallSite, CallSiteKey, NewEntry, ReportUnit, TraceLink, ValueGroup};
use crate::aggregator::{fold_into, reduce, validate, Dashboard};
use crate::stack::{StackTrace, StackTraceId};
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::ReportError;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

/// Outcome of applying a live unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit was appended under this log index
    Applied(u64),
    /// The store already covers this log index; nothing changed
    Duplicate(u64),
}

/// Append-only collection of call sites, traces and dashboard aggregates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportStore {
    call_sites: Vec<CallSite>,
    keys: Vec<CallSiteKey>,
    site_index: HashMap<CallSiteKey, usize>,
    /// log index -> (site position, group position)
    locations: BTreeMap<u64, (usize, usize)>,
    stack_traces: BTreeMap<StackTraceId, StackTrace>,
    dashboard: Dashboard,
    next_log_index: u64,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation at a call site
    ///
    /// **Public** - the only way new entries enter a store
    ///
    /// Creates the call site on first use, stores an attached stack trace
    /// under the entry's own log index and folds dashboard payloads into the
    /// aggregates.
    ///
    /// # Returns
    /// The log index assigned to the entry
    ///
    /// # Errors
    /// * `ReportError::InvalidCallSite` - empty filename or line 0
    /// * `ReportError::InvalidPayload` - malformed dashboard payload
    /// * `ReportError::SiteKindMismatch` - dashboard and plain entries mixed at one site
    /// * `ReportError::UnknownStackTrace` - shared trace id not in the store
    pub fn append(&mut self, site: CallSiteKey, entry: NewEntry) -> Result<u64, ReportError> {
        let log_index = self.next_log_index;

        let (stack_trace_id, new_trace) = match entry.stack_trace {
            Some(TraceLink::Attached(trace)) => (Some(StackTraceId(log_index)), Some(trace)),
            Some(TraceLink::Shared(id)) => (Some(id), None),
            None => (None, None),
        };

        let group = ValueGroup {
            log_index,
            function_name: entry.function_name,
            enclosing_type_name: entry.enclosing_type_name,
            name: entry.name,
            values: entry.values,
            stack_trace_id,
            dashboard: entry.dashboard,
        };

        self.insert_folded(site, group, new_trace)?;
        Ok(log_index)
    }

    /// Apply a live unit exactly once
    ///
    /// Units at or below an index the store already covers are skipped;
    /// a unit past the next expected index means something was lost.
    ///
    /// # Errors
    /// * `ReportError::OutOfSequence` - the unit skips ahead of the next log index
    /// * any error `append` can return
    pub fn apply_unit(&mut self, unit: ReportUnit) -> Result<UnitOutcome, ReportError> {
        let log_index = unit.value_group.log_index;

        if log_index < self.next_log_index {
            debug!("Skipping already applied unit {}", log_index);
            return Ok(UnitOutcome::Duplicate(log_index));
        }
        if log_index > self.next_log_index {
            return Err(ReportError::OutOfSequence {
                expected: self.next_log_index,
                got: log_index,
            });
        }

        self.insert_folded(unit.call_site, unit.value_group, unit.stack_trace)?;
        Ok(UnitOutcome::Applied(log_index))
    }

    /// Replace this store wholesale with the state described by `document`
    ///
    /// The current state is kept if the document is invalid.
    pub fn merge_snapshot(&mut self, document: ReportDocument) -> Result<(), ReportError> {
        let rebuilt = Self::from_document(document)?;
        info!(
            "Applied snapshot: {} entries, next log index {}",
            rebuilt.len(),
            rebuilt.next_log_index
        );
        *self = rebuilt;
        Ok(())
    }

    /// Rebuild a store from an export document
    ///
    /// Value groups are inserted in log index order and the dashboard is
    /// recomputed from them in one batch; a dashboard carried by the
    /// document is only compared against the result.
    ///
    /// # Errors
    /// * `ReportError::InvalidSnapshot` - incompatible version, bad trace ids,
    ///   duplicate sites, log indices other than exactly `0..next_log_index`,
    ///   or any entry that would fail `append`
    pub fn from_document(document: ReportDocument) -> Result<Self, ReportError> {
        if !document.is_compatible() {
            return Err(ReportError::InvalidSnapshot(format!(
                "unsupported schema version '{}' (expected {})",
                document.version, SCHEMA_VERSION
            )));
        }

        let next_log_index = document.next_log_index;
        let mut store = Self::new();

        for (key, trace) in document.stack_traces {
            let id = key
                .parse::<u64>()
                .map_err(|_| ReportError::InvalidSnapshot(format!("bad stack trace id '{}'", key)))?;
            if id >= next_log_index {
                return Err(ReportError::InvalidSnapshot(format!(
                    "stack trace id {} is not below next log index {}",
                    id, next_log_index
                )));
            }
            store.stack_traces.insert(StackTraceId(id), trace);
        }

        let mut pending: Vec<(CallSiteKey, ValueGroup)> = Vec::new();
        for site in document.call_sites {
            let key = site.key();
            validate_site(&key).map_err(snapshot_error)?;
            if store.site_index.contains_key(&key) {
                return Err(ReportError::InvalidSnapshot(format!("duplicate call site {}", key)));
            }

            let CallSite {
                filename,
                line,
                function_name,
                enclosing_type_name,
                is_dashboard,
                value_groups,
            } = site;
            pending.extend(value_groups.into_iter().map(|g| (key.clone(), g)));

            store.site_index.insert(key.clone(), store.call_sites.len());
            store.keys.push(key);
            store.call_sites.push(CallSite {
                filename,
                line,
                function_name,
                enclosing_type_name,
                is_dashboard,
                value_groups: Vec::new(),
            });
        }

        pending.sort_by_key(|(_, g)| g.log_index);
        for (key, group) in pending {
            let log_index = group.log_index;
            if log_index < store.next_log_index {
                return Err(ReportError::InvalidSnapshot(format!(
                    "duplicate log index {}",
                    log_index
                )));
            }
            if log_index > store.next_log_index {
                return Err(ReportError::InvalidSnapshot(format!(
                    "missing log index {} (next entry is {})",
                    store.next_log_index, log_index
                )));
            }
            if log_index >= next_log_index {
                return Err(ReportError::InvalidSnapshot(format!(
                    "log index {} is not below next log index {}",
                    log_index, next_log_index
                )));
            }
            store
                .insert(key, group, None)
                .map_err(|e| ReportError::InvalidSnapshot(format!("entry {}: {}", log_index, e)))?;
        }

        if store.next_log_index != next_log_index {
            return Err(ReportError::InvalidSnapshot(format!(
                "document holds {} entries but declares next log index {}",
                store.next_log_index, next_log_index
            )));
        }
        store.dashboard = reduce(store.entries());

        if let Some(carried) = document.dashboard {
            if carried != store.dashboard {
                warn!("Snapshot dashboard does not match its value groups; using recomputed aggregates");
            }
        }

        debug!(
            "Rebuilt store from document: {} call sites, {} entries, {} traces",
            store.call_sites.len(),
            store.len(),
            store.stack_traces.len()
        );
        Ok(store)
    }

    /// Export the store as a self-describing document
    pub fn to_document(&self) -> ReportDocument {
        ReportDocument {
            version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            next_log_index: self.next_log_index,
            call_sites: self.call_sites.clone(),
            stack_traces: self
                .stack_traces
                .iter()
                .map(|(id, trace)| (id.to_string(), trace.clone()))
                .collect(),
            dashboard: Some(self.dashboard.clone()),
        }
    }

    /// Call sites in order of first observation
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    pub fn call_site(&self, key: &CallSiteKey) -> Option<&CallSite> {
        self.site_index.get(key).map(|&i| &self.call_sites[i])
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn stack_trace(&self, id: StackTraceId) -> Option<&StackTrace> {
        self.stack_traces.get(&id)
    }

    pub fn stack_traces(&self) -> &BTreeMap<StackTraceId, StackTrace> {
        &self.stack_traces
    }

    /// The entry with `log_index` and its call site
    pub fn value_group(&self, log_index: u64) -> Option<(&CallSiteKey, &ValueGroup)> {
        self.locations
            .get(&log_index)
            .map(|&(site, group)| (&self.keys[site], &self.call_sites[site].value_groups[group]))
    }

    /// Every entry with its call site, in log index order
    pub fn entries(&self) -> impl Iterator<Item = (&CallSiteKey, &ValueGroup)> + '_ {
        self.locations
            .values()
            .map(|&(site, group)| (&self.keys[site], &self.call_sites[site].value_groups[group]))
    }

    /// The entry with `log_index` packaged as a live unit, including the
    /// trace it introduced
    pub fn unit(&self, log_index: u64) -> Option<ReportUnit> {
        let (key, group) = self.value_group(log_index)?;
        let stack_trace = match group.stack_trace_id {
            Some(id) if id == StackTraceId(log_index) => self.stack_traces.get(&id).cloned(),
            _ => None,
        };
        Some(ReportUnit {
            call_site: key.clone(),
            value_group: group.clone(),
            stack_trace,
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn next_log_index(&self) -> u64 {
        self.next_log_index
    }

    fn insert_folded(
        &mut self,
        site: CallSiteKey,
        group: ValueGroup,
        new_trace: Option<StackTrace>,
    ) -> Result<(), ReportError> {
        let (site_pos, group_pos) = self.insert(site, group, new_trace)?;
        let key = &self.keys[site_pos];
        let group = &self.call_sites[site_pos].value_groups[group_pos];
        fold_into(&mut self.dashboard, key, group);
        Ok(())
    }

    /// Validate and store a group without touching the dashboard
    fn insert(
        &mut self,
        site: CallSiteKey,
        group: ValueGroup,
        new_trace: Option<StackTrace>,
    ) -> Result<(usize, usize), ReportError> {
        validate_site(&site)?;
        if let Some(payload) = &group.dashboard {
            validate(payload)?;
        }

        let is_dashboard = group.dashboard.is_some();
        if let Some(&pos) = self.site_index.get(&site) {
            if self.call_sites[pos].is_dashboard != is_dashboard {
                return Err(ReportError::SiteKindMismatch {
                    filename: site.filename,
                    line: site.line,
                });
            }
        }

        match (&new_trace, group.stack_trace_id) {
            (Some(_), None) => {
                return Err(ReportError::InvalidPayload(
                    "stack trace supplied without a stack trace id".to_string(),
                ));
            }
            (Some(_), Some(id)) if self.stack_traces.contains_key(&id) => {
                return Err(ReportError::InvalidPayload(format!(
                    "stack trace id {} is already in use",
                    id
                )));
            }
            (None, Some(id)) if !self.stack_traces.contains_key(&id) => {
                return Err(ReportError::UnknownStackTrace(id.0));
            }
            _ => {}
        }

        // Everything checked; mutate
        let site_pos = match self.site_index.get(&site) {
            Some(&pos) => pos,
            None => {
                let pos = self.call_sites.len();
                self.call_sites.push(CallSite {
                    filename: site.filename.clone(),
                    line: site.line,
                    function_name: group.function_name.clone(),
                    enclosing_type_name: group.enclosing_type_name.clone(),
                    is_dashboard,
                    value_groups: Vec::new(),
                });
                self.keys.push(site.clone());
                self.site_index.insert(site, pos);
                pos
            }
        };

        if let (Some(trace), Some(id)) = (new_trace, group.stack_trace_id) {
            self.stack_traces.insert(id, trace);
        }

        let log_index = group.log_index;
        let groups = &mut self.call_sites[site_pos].value_groups;
        let group_pos = groups.len();
        groups.push(group);
        self.locations.insert(log_index, (site_pos, group_pos));
        self.next_log_index = log_index + 1;

        Ok((site_pos, group_pos))
    }
}

fn validate_site(site: &CallSiteKey) -> Result<(), ReportError> {
    if site.filename.trim().is_empty() {
        return Err(ReportError::InvalidCallSite("filename cannot be empty".to_string()));
    }
    if site.line == 0 {
        return Err(ReportError::InvalidCallSite(format!(
            "{}: line numbers start at 1",
            site.filename
        )));
    }
    Ok(())
}

fn snapshot_error(e: ReportError) -> ReportError {
    ReportError::InvalidSnapshot(e.to_string())
}
