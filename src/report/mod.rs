//! Debug recording report engine.
//!
//! - `model` - call sites, value groups and dashboard payloads
//! - `store` - the append-only report store with its incremental dashboard
//! - `document` - the serialized export form
//! - `recorder` - the process-wide recorder behind the recording macros
//! - `observation` - JSON-lines observation input for offline builds

pub mod document;
pub mod model;
pub mod observation;
pub mod recorder;
pub mod store;

// Re-export main types and functions
pub use document::ReportDocument;
pub use model::{
    CallSite, CallSiteKey, DashboardKind, DashboardPayload, EntryRef, NamedValue, NewEntry,
    ReportUnit, TraceLink, ValueGroup,
};
pub use observation::{load_observations, LoadStats, Observation, ObservationKind};
pub use recorder::{capture_value, recorder, Recorder, Site, UnitSink};
pub use store::{ReportStore, UnitOutcome};
