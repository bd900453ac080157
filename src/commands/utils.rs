use super::correlate::load_store;
use crate::report::ReportStore;
use crate::utils::config::SCHEMA_VERSION;
use anyhow::Result;
use colored::*;
use std::path::PathBuf;

/// Validate a report JSON file
///
/// Checks the schema version and the internal consistency of the report
/// by rebuilding its store.
pub fn validate_report_file(file_path: PathBuf) -> Result<ReportStore> {
    println!("Validating report: {}", file_path.display());

    let store = load_store(&file_path)?;
    let dashboard = store.dashboard();

    println!("{}", "✓ Valid report JSON".green());
    println!("  Schema Version: {}", SCHEMA_VERSION);
    println!("  Entries: {}", store.len());
    println!("  Call Sites: {}", store.call_sites().len());
    println!("  Stack Traces: {}", store.stack_traces().len());
    println!(
        "  Dashboard: {} count / {} histogram / {} timeline / {} happened",
        dashboard.counts.len(),
        dashboard.histograms.len(),
        dashboard.timeline.len(),
        dashboard.happened.len()
    );

    Ok(store)
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Autopsy Report Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string           - Schema version (e.g., '1.0.0')");
        println!("  generated_at: string      - RFC 3339 timestamp");
        println!("  next_log_index: number    - Index the next entry will receive");
        println!("  call_sites: array         - Call sites in order of first observation");
        println!("    filename: string        - Source file");
        println!("    line: number            - Line number");
        println!("    function_name: string   - Function observed at the site");
        println!("    is_dashboard: bool      - Dashboard or plain value site");
        println!("    value_groups: array     - Entries in log order");
        println!("      log_index: number     - Position in the global log");
        println!("      name: string?         - Entry label");
        println!("      values: array         - {{name?, value}} pairs");
        println!("      stack_trace_id: number? - Linked stack trace");
        println!("      dashboard: object?    - {{kind, ...}} payload");
        println!("  stack_traces: object      - Trace id -> {{frames, captured_at}}");
        println!("  dashboard: object?        - Derived aggregates (recomputed on load)");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Autopsy v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("In-process debug recording with call-stack queries and dashboards.");
}
