//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod build;
pub mod correlate;
pub mod live;
pub mod models;
pub mod utils;

// Re-export main command functions
pub use build::execute_build;
pub use correlate::{execute_correlate, load_store};
pub use live::execute_live;
pub use models::{parse_mark, BuildArgs, CorrelateArgs, LiveArgs};
pub use utils::{display_schema, display_version, validate_report_file};
