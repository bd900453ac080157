//! Correlate command implementation.
//! Re-attaches marks made on one report to a regenerated report.

use super::models::CorrelateArgs;
use crate::correlate::{reattach, Reattachment};
use crate::output::{read_report, render_reattachments};
use crate::report::ReportStore;
use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

/// Execute the correlate command
///
/// A mark that cannot be re-attached is reported, not an error.
pub fn execute_correlate(args: CorrelateArgs) -> Result<Vec<Reattachment>> {
    // Step 1: Load both reports
    let old = load_store(&args.old_report).context("Failed to load original report")?;
    let new = load_store(&args.new_report).context("Failed to load regenerated report")?;

    // Step 2: Re-attach
    let results = reattach(&old, &new, &args.marks);

    // Step 3: Write output if requested
    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, json).context("Failed to write correlation JSON")?;
        println!(
            "Correlation written to {}",
            path.display().to_string().cyan()
        );
    }

    // Step 4: Terminal summary
    println!("{}", render_reattachments(&results));

    Ok(results)
}

/// Read a report file and rebuild its store
///
/// **Public** - shared with the validate command
pub fn load_store(path: &Path) -> Result<ReportStore> {
    let document = read_report(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ReportStore::from_document(document)
        .with_context(|| format!("Report {} is not a valid report", path.display()))
}
