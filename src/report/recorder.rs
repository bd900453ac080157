//! Process-wide recorder and the recording macros.
//!
//! Instrumented code records through macros that derive the call site from
//! `file!()`/`line!()` and the enclosing function from a `type_name` probe,
//! and name each argument after its source expression:
//!
//! ```ignore
//! use autopsy::{count, hist, happened, timeline};
//!
//! fn checkout(cart: &Cart) {
//!     autopsy::scope!();
//!     autopsy::bind!(cart);
//!     autopsy::log!("totals", cart.subtotal(), cart.tax());
//!     count!(cart.payment_method());
//!     hist!(cart.items.len());
//!     timeline!("checkout");
//!     happened!("checkout without coupon");
//! }
//! ```
//!
//! All recording goes into one [`ReportStore`] behind a mutex. Recording
//! never panics: a rejected observation is logged and dropped.

use super::document::ReportDocument;
use super::model::{CallSiteKey, DashboardPayload, NamedValue, NewEntry, ReportUnit};
use super::store::ReportStore;
use crate::output::write_report;
use crate::stack::{FrameSource, LiveStack, StackFrame};
use crate::utils::config::ReportConfig;
use crate::utils::error::OutputError;
use crate::value::{capture, CaptureLimits, Value};
use chrono::Utc;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::cell::Cell;
use std::path::Path;
use std::sync::OnceLock;

thread_local! {
    static IN_SINK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a sink until dropped
struct SinkGuard;

impl SinkGuard {
    fn enter() -> Self {
        IN_SINK.with(|flag| flag.set(true));
        SinkGuard
    }

    fn active() -> bool {
        IN_SINK.with(Cell::get)
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        IN_SINK.with(|flag| flag.set(false));
    }
}

/// Receives every appended entry, in append order
///
/// Sinks run while the recorder's store is locked. Anything a sink records
/// through the recorder on the same thread is dropped with a warning.
pub trait UnitSink: Send {
    fn publish(&mut self, unit: ReportUnit);

    /// Full state to restart from; units published afterwards follow it
    /// without a gap
    fn resync(&mut self, _document: ReportDocument) {}
}

impl<F: FnMut(ReportUnit) + Send> UnitSink for F {
    fn publish(&mut self, unit: ReportUnit) {
        self(unit)
    }
}

/// Where an observation was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    pub type_name: Option<&'static str>,
}

impl Site {
    pub fn key(&self) -> CallSiteKey {
        CallSiteKey::new(self.file, self.line)
    }

    /// Frame for the recording location, without variables
    pub fn frame(&self) -> StackFrame {
        let mut frame = StackFrame::new(self.file, self.function, self.line.max(1));
        frame.enclosing_type_name = self.type_name.map(str::to_string);
        frame
    }
}

/// Recorder shared by the recording macros
pub struct Recorder {
    store: Mutex<ReportStore>,
    config: RwLock<ReportConfig>,
    sink: Mutex<Option<Box<dyn UnitSink>>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(ReportConfig::default())
    }
}

impl Recorder {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            store: Mutex::new(ReportStore::new()),
            config: RwLock::new(config),
            sink: Mutex::new(None),
        }
    }

    pub fn configure(&self, config: ReportConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> ReportConfig {
        self.config.read().clone()
    }

    /// Limits used when capturing recorded values
    pub fn capture_limits(&self) -> CaptureLimits {
        let config = self.config.read();
        CaptureLimits {
            max_string_len: config.max_string_len,
            max_depth: config.max_depth,
        }
    }

    /// Mirror every subsequent append to `sink`
    pub fn set_sink(&self, sink: Box<dyn UnitSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Hand `sink` the current report, then mirror every subsequent append
    ///
    /// The store stays locked in between, so no entry falls into the gap.
    pub fn attach_sink(&self, mut sink: Box<dyn UnitSink>) {
        let store = self.store.lock();
        {
            let _guard = SinkGuard::enter();
            sink.resync(store.to_document());
        }
        *self.sink.lock() = Some(sink);
    }

    /// Send the attached sink a fresh snapshot, e.g. after its reader lost
    /// track of the unit sequence
    pub fn resync_sink(&self) {
        let store = self.store.lock();
        if let Some(sink) = self.sink.lock().as_mut() {
            let _guard = SinkGuard::enter();
            sink.resync(store.to_document());
        }
    }

    pub fn clear_sink(&self) {
        *self.sink.lock() = None;
    }

    /// Append an entry recorded at `site`
    ///
    /// Captures the live stack first when automatic stack traces are on and
    /// the entry does not already link one.
    ///
    /// # Returns
    /// The assigned log index, or `None` if the store rejected the entry
    pub fn record(&self, site: &Site, mut entry: NewEntry) -> Option<u64> {
        if SinkGuard::active() {
            warn!(
                "Dropped observation at {}:{}: recorded from inside a unit sink",
                site.file, site.line
            );
            return None;
        }

        let (auto_trace, code_context) = {
            let config = self.config.read();
            (config.auto_stack_trace, config.capture_code_context)
        };

        if auto_trace && entry.stack_trace.is_none() {
            let trace = LiveStack::at(site.frame())
                .with_code_context(code_context)
                .capture();
            entry = entry.with_trace(trace);
        }

        let mut store = self.store.lock();
        match store.append(site.key(), entry) {
            Ok(log_index) => {
                if let Some(sink) = self.sink.lock().as_mut() {
                    if let Some(unit) = store.unit(log_index) {
                        let _guard = SinkGuard::enter();
                        sink.publish(unit);
                    }
                }
                Some(log_index)
            }
            Err(e) => {
                warn!("Dropped observation at {}:{}: {}", site.file, site.line, e);
                None
            }
        }
    }

    pub fn log_values(&self, site: &Site, name: Option<String>, values: Vec<NamedValue>) -> Option<u64> {
        let mut entry = self.entry(site, None);
        entry.name = name;
        entry.values = values;
        self.record(site, entry)
    }

    pub fn count(&self, site: &Site, value: Value) -> Option<u64> {
        self.record(site, self.entry(site, Some(DashboardPayload::Count { value })))
    }

    /// Record a histogram sample; non-numeric values are rejected
    pub fn hist(&self, site: &Site, value: Value) -> Option<u64> {
        match value.as_f64() {
            Some(value) => {
                self.record(site, self.entry(site, Some(DashboardPayload::Histogram { value })))
            }
            None => {
                warn!(
                    "Dropped histogram sample at {}:{}: expected a number, got {}",
                    site.file,
                    site.line,
                    value.type_name()
                );
                None
            }
        }
    }

    /// Record a timeline event stamped with the current time
    pub fn timeline(&self, site: &Site, event_name: &str) -> Option<u64> {
        let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let payload = DashboardPayload::Timeline {
            event_name: event_name.to_string(),
            timestamp,
        };
        self.record(site, self.entry(site, Some(payload)))
    }

    pub fn happened(&self, site: &Site, message: Option<&str>) -> Option<u64> {
        let payload = DashboardPayload::Occurrence {
            message: message.map(str::to_string),
        };
        self.record(site, self.entry(site, Some(payload)))
    }

    fn entry(&self, site: &Site, payload: Option<DashboardPayload>) -> NewEntry {
        let mut entry = NewEntry::values(site.function, Vec::new());
        entry.enclosing_type_name = site.type_name.map(str::to_string);
        entry.dashboard = payload;
        entry
    }

    /// Copy of the current store
    pub fn snapshot(&self) -> ReportStore {
        self.store.lock().clone()
    }

    pub fn document(&self) -> ReportDocument {
        self.store.lock().to_document()
    }

    /// Start over with an empty store, returning what was recorded
    pub fn reset(&self) -> ReportStore {
        let previous = std::mem::take(&mut *self.store.lock());
        if !previous.is_empty() {
            debug!("Recorder reset, discarding {} entries", previous.len());
        }
        previous
    }

    /// Write the current report to a JSON file
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<(), OutputError> {
        write_report(&self.document(), path)
    }
}

/// The process-wide recorder
pub fn recorder() -> &'static Recorder {
    static RECORDER: OnceLock<Recorder> = OnceLock::new();
    RECORDER.get_or_init(Recorder::default)
}

/// Capture a value with the global recorder's limits
pub fn capture_value<T: Serialize + ?Sized>(value: &T) -> Value {
    capture(value, recorder().capture_limits())
}

#[doc(hidden)]
pub fn type_name_of<T>(_: &T) -> &'static str {
    std::any::type_name::<T>()
}

/// Split a probe path like `app::cart::Cart::checkout::{{closure}}::__autopsy_probe`
/// into the function name and, for methods, the type name
#[doc(hidden)]
pub fn split_function_path(path: &'static str) -> (&'static str, Option<&'static str>) {
    let mut path = path.strip_suffix("::__autopsy_probe").unwrap_or(path);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }

    let mut segments = path.rsplit("::");
    let function = segments.next().unwrap_or(path);
    let type_name = segments.next().filter(|s| {
        s.starts_with(|c: char| c.is_ascii_uppercase())
            && s.chars().all(|c| c.is_alphanumeric() || c == '_')
    });
    (function, type_name)
}

/// Name to record for an argument expression; literals have none
#[doc(hidden)]
pub fn arg_name(expression: &'static str) -> Option<String> {
    let literal = expression.starts_with(|c: char| c.is_ascii_digit() || c == '"' || c == '\'' || c == '-')
        || expression.starts_with("r\"")
        || expression.starts_with("r#")
        || expression == "true"
        || expression == "false";
    if literal {
        None
    } else {
        Some(expression.to_string())
    }
}

/// A leading string literal becomes the entry name; any other literal is a value
#[doc(hidden)]
pub fn literal_label(expression: &'static str, value: Value) -> Result<String, Value> {
    let is_string = expression.starts_with('"') || expression.starts_with('r');
    match value {
        Value::Str(label) if is_string => Ok(label),
        other => Err(other),
    }
}

/// Name of the enclosing function
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __autopsy_probe() {}
        $crate::report::recorder::split_function_path($crate::report::recorder::type_name_of(
            &__autopsy_probe,
        ))
        .0
    }};
}

/// The current recording site
#[macro_export]
macro_rules! site {
    () => {{
        fn __autopsy_probe() {}
        let (function, type_name) = $crate::report::recorder::split_function_path(
            $crate::report::recorder::type_name_of(&__autopsy_probe),
        );
        $crate::report::recorder::Site {
            file: ::std::file!(),
            line: ::std::line!(),
            function,
            type_name,
        }
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __named_value {
    ($arg:expr) => {
        $crate::report::model::NamedValue {
            name: $crate::report::recorder::arg_name(::std::stringify!($arg)),
            value: $crate::report::recorder::capture_value(&$arg),
        }
    };
}

/// Record values at this call site
///
/// A leading string literal names the entry; `name = expr` names it
/// explicitly. Each other argument is recorded under its source text.
///
/// A line holds either plain entries or dashboard entries (`count!`,
/// `hist!`, `timeline!`, `happened!`), never both: whichever kind is recorded
/// there first wins and the other is dropped with a warning.
#[macro_export]
macro_rules! log {
    (name = $name:expr $(, $arg:expr)* $(,)?) => {
        $crate::report::recorder::recorder().log_values(
            &$crate::site!(),
            ::std::option::Option::Some(::std::string::ToString::to_string(&$name)),
            ::std::vec![$($crate::__named_value!($arg)),*],
        )
    };
    ($label:literal $(, $arg:expr)* $(,)?) => {{
        let __site = $crate::site!();
        let mut __values = ::std::vec![$($crate::__named_value!($arg)),*];
        let __name = match $crate::report::recorder::literal_label(
            ::std::stringify!($label),
            $crate::report::recorder::capture_value(&$label),
        ) {
            ::std::result::Result::Ok(label) => ::std::option::Option::Some(label),
            ::std::result::Result::Err(value) => {
                __values.insert(0, $crate::report::model::NamedValue { name: None, value });
                ::std::option::Option::None
            }
        };
        $crate::report::recorder::recorder().log_values(&__site, __name, __values)
    }};
    ($($arg:expr),* $(,)?) => {
        $crate::report::recorder::recorder().log_values(
            &$crate::site!(),
            ::std::option::Option::None,
            ::std::vec![$($crate::__named_value!($arg)),*],
        )
    };
}

/// Count how often this call site sees each distinct value
///
/// Values are told apart by [`Value::canonical_key`](crate::value::Value::canonical_key).
/// The line cannot also hold `log!` entries; see [`log!`].
#[macro_export]
macro_rules! count {
    ($value:expr $(,)?) => {
        $crate::report::recorder::recorder()
            .count(&$crate::site!(), $crate::report::recorder::capture_value(&$value))
    };
}

/// Record a numeric sample for this call site's histogram
#[macro_export]
macro_rules! hist {
    ($value:expr $(,)?) => {
        $crate::report::recorder::recorder()
            .hist(&$crate::site!(), $crate::report::recorder::capture_value(&$value))
    };
}

/// Record a named, timestamped event
#[macro_export]
macro_rules! timeline {
    ($event:expr $(,)?) => {
        $crate::report::recorder::recorder().timeline(
            &$crate::site!(),
            &::std::string::ToString::to_string(&$event),
        )
    };
}

/// Count invocations of this call site, optionally with a message
#[macro_export]
macro_rules! happened {
    () => {
        $crate::report::recorder::recorder().happened(&$crate::site!(), ::std::option::Option::None)
    };
    ($message:expr $(,)?) => {
        $crate::report::recorder::recorder().happened(
            &$crate::site!(),
            ::std::option::Option::Some(::std::string::ToString::to_string(&$message).as_str()),
        )
    };
}

/// Query engine over the live stack, with this line as the current frame
#[macro_export]
macro_rules! call_stack {
    () => {
        $crate::query::live_call_stack($crate::site!().frame())
    };
}

/// Push a frame for the enclosing function until the end of the block
#[macro_export]
macro_rules! scope {
    () => {
        let __autopsy_scope = {
            let __site = $crate::site!();
            $crate::stack::enter_scope(__site.file, __site.function, __site.line, __site.type_name)
        };
    };
}

/// Publish variables to the innermost scope under their own names
#[macro_export]
macro_rules! bind {
    ($($var:ident),+ $(,)?) => {
        $(
            $crate::stack::bind(
                ::std::stringify!($var),
                $crate::report::recorder::capture_value(&$var),
            );
        )+
    };
    ($name:literal => $value:expr) => {
        $crate::stack::bind($name, $crate::report::recorder::capture_value(&$value));
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackTraceId;
    use std::sync::mpsc;

    fn test_site(line: u32) -> Site {
        Site {
            file: "src/recorder_test.rs",
            line,
            function: "run",
            type_name: Some("Job"),
        }
    }

    #[test]
    fn test_split_function_path() {
        assert_eq!(
            split_function_path("app::cart::Cart::checkout::__autopsy_probe"),
            ("checkout", Some("Cart"))
        );
        assert_eq!(
            split_function_path("app::main::{{closure}}::{{closure}}::__autopsy_probe"),
            ("main", None)
        );
        assert_eq!(split_function_path("app::run::__autopsy_probe"), ("run", None));
    }

    #[test]
    fn test_function_name_macro() {
        assert_eq!(crate::function_name!(), "test_function_name_macro");
    }

    #[test]
    fn test_arg_names() {
        assert_eq!(arg_name("order.total"), Some("order.total".to_string()));
        assert_eq!(arg_name("42"), None);
        assert_eq!(arg_name("\"text\""), None);
        assert_eq!(arg_name("true"), None);
    }

    #[test]
    fn test_literal_label() {
        assert_eq!(literal_label("\"totals\"", Value::from("totals")), Ok("totals".to_string()));
        assert_eq!(literal_label("7", Value::Int(7)), Err(Value::Int(7)));
    }

    #[test]
    fn test_record_with_auto_trace() {
        let recorder = Recorder::default();
        let site = test_site(12);

        let idx = recorder.count(&site, Value::from("card")).unwrap();
        let store = recorder.snapshot();
        let (_, group) = store.value_group(idx).unwrap();

        assert_eq!(group.stack_trace_id, Some(StackTraceId(idx)));
        let trace = store.stack_trace(StackTraceId(idx)).unwrap();
        assert_eq!(trace.frames[0].function_name, "run");
        assert_eq!(trace.frames[0].enclosing_type_name.as_deref(), Some("Job"));
    }

    #[test]
    fn test_record_without_auto_trace() {
        let recorder = Recorder::new(ReportConfig {
            auto_stack_trace: false,
            ..ReportConfig::default()
        });
        let idx = recorder.happened(&test_site(3), Some("hi")).unwrap();
        let store = recorder.snapshot();
        assert_eq!(store.value_group(idx).unwrap().1.stack_trace_id, None);
        assert!(store.stack_traces().is_empty());
    }

    #[test]
    fn test_hist_rejects_non_numeric() {
        let recorder = Recorder::default();
        assert!(recorder.hist(&test_site(4), Value::from("high")).is_none());
        assert!(recorder.hist(&test_site(4), Value::Float(f64::NAN)).is_some());
        assert_eq!(recorder.snapshot().len(), 1);
    }

    #[test]
    fn test_rejected_observation_is_dropped() {
        let recorder = Recorder::default();
        recorder.count(&test_site(5), Value::Int(1)).unwrap();
        assert!(recorder.log_values(&test_site(5), None, Vec::new()).is_none());
        assert_eq!(recorder.snapshot().len(), 1);
    }

    #[test]
    fn test_sink_receives_units_in_order() {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::channel();
        recorder.set_sink(Box::new(move |unit: ReportUnit| {
            let _ = tx.send(unit);
        }));

        recorder.count(&test_site(1), Value::Int(1));
        recorder.timeline(&test_site(2), "tick");
        recorder.clear_sink();
        recorder.count(&test_site(1), Value::Int(2));

        let units: Vec<ReportUnit> = rx.try_iter().collect();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].value_group.log_index, 0);
        assert!(units[0].stack_trace.is_some());
        assert_eq!(units[1].call_site, test_site(2).key());
    }

    #[test]
    fn test_recording_from_sink_is_dropped() {
        let recorder = std::sync::Arc::new(Recorder::default());
        let inner = std::sync::Arc::clone(&recorder);
        let (tx, rx) = mpsc::channel();
        recorder.attach_sink(Box::new(move |_unit: ReportUnit| {
            let _ = tx.send(inner.count(&test_site(9), Value::Int(0)));
        }));

        assert_eq!(recorder.count(&test_site(1), Value::Int(1)), Some(0));
        assert_eq!(recorder.count(&test_site(1), Value::Int(2)), Some(1));
        recorder.clear_sink();

        let nested: Vec<Option<u64>> = rx.try_iter().collect();
        assert_eq!(nested, vec![None, None]);
        assert_eq!(recorder.snapshot().len(), 2);
        // The guard is released once the sink returns
        assert_eq!(recorder.count(&test_site(9), Value::Int(0)), Some(2));
    }

    #[test]
    fn test_plain_and_dashboard_entries_do_not_share_a_line() {
        let recorder = Recorder::default();
        assert!(recorder.log_values(&test_site(7), None, Vec::new()).is_some());
        assert!(recorder.count(&test_site(7), Value::Int(1)).is_none());
        assert!(recorder.happened(&test_site(7), None).is_none());
        assert_eq!(recorder.snapshot().len(), 1);
    }

    #[test]
    fn test_reset_returns_previous_store() {
        let recorder = Recorder::default();
        recorder.count(&test_site(1), Value::Int(1));
        let previous = recorder.reset();
        assert_eq!(previous.len(), 1);
        assert!(recorder.snapshot().is_empty());
        assert_eq!(recorder.count(&test_site(1), Value::Int(1)), Some(0));
    }
}
