//! Live command implementation.
//! Replays a stream of transport messages through a live session.

use super::models::LiveArgs;
use crate::live::{feed_lines, LiveSession, SessionEvent};
use crate::output::{render_report_summary, write_report};
use crate::report::ReportStore;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufReader};

/// Execute the live command
///
/// **Public** - main entry point called from main.rs
///
/// Resync requests cannot be answered from a finished stream; they are
/// reported and the session keeps waiting for a later snapshot.
pub fn execute_live(args: LiveArgs) -> Result<ReportStore> {
    let session = LiveSession::start(args.live.clone()).context("Failed to start live session")?;
    let sender = session.sender();

    let delivered = match &args.input {
        Some(path) => {
            info!("Replaying live messages from: {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            feed_lines(BufReader::new(file), &sender)
        }
        None => {
            info!("Reading live messages from stdin");
            feed_lines(io::stdin().lock(), &sender)
        }
    }
    .context("Live session stopped while reading input")?;

    let store = session_result(session);
    debug!("Delivered {} messages", delivered);

    write_report(&store.to_document(), &args.output).context("Failed to write report JSON")?;
    info!("✓ Report written to: {}", args.output.display());

    if args.print_summary {
        println!("{}", render_report_summary(&store, args.top_values));
    }

    Ok(store)
}

fn session_result(session: LiveSession) -> ReportStore {
    let (store, events) = session.finish();
    for event in events {
        match event {
            SessionEvent::ResyncRequested { reason } => {
                warn!("Live stream needed a snapshot: {}", reason)
            }
            SessionEvent::SnapshotApplied { entries } => {
                debug!("Snapshot applied with {} entries", entries)
            }
            SessionEvent::Published { .. } => {}
        }
    }
    store
}
