//! Build command implementation.
//!
//! The build command:
//! 1. Reads JSON-lines observations
//! 2. Appends them to a fresh report store
//! 3. Writes the report document
//! 4. Optionally prints a summary

use super::models::BuildArgs;
use crate::output::{render_report_summary, write_report, write_report_compact};
use crate::report::{load_observations, LoadStats, ReportStore};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Instant;

/// Execute the build command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// The built store and the per-line load statistics
///
/// # Errors
/// * Input file cannot be read
/// * Any line was rejected while `strict` is set
/// * Report cannot be written
pub fn execute_build(args: BuildArgs) -> Result<(ReportStore, LoadStats)> {
    let start_time = Instant::now();
    info!("Building report from: {}", args.input.display());

    // Step 1: Read observations
    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read observations from {}", args.input.display()))?;

    // Step 2: Append in file order
    let mut store = ReportStore::new();
    let stats = load_observations(&mut store, &input);
    debug!(
        "Loaded {} observations into {} call sites",
        stats.appended,
        store.call_sites().len()
    );

    if !stats.rejected.is_empty() {
        warn!("{} observation lines were rejected", stats.rejected.len());
        if args.strict {
            let (line, reason) = &stats.rejected[0];
            anyhow::bail!(
                "{} observation lines rejected (first at line {}: {})",
                stats.rejected.len(),
                line,
                reason
            );
        }
    }

    // Step 3: Write report
    let document = store.to_document();
    if args.compact {
        write_report_compact(&document, &args.output)
    } else {
        write_report(&document, &args.output)
    }
    .context("Failed to write report JSON")?;

    info!("✓ Report written to: {}", args.output.display());

    // Step 4: Summary
    if args.print_summary {
        println!("{}", render_report_summary(&store, args.top_values));
    }

    info!("Build completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok((store, stats))
}
