//! Terminal output rendering for reports and correlation results.

use crate::aggregator::{calculate_histogram_summary, calculate_hot_values};
use crate::correlate::Reattachment;
use crate::report::ReportStore;
use colored::*;

const RULE: &str = "---------------------------------------------------\n";

/// Render a human-readable summary of a report for the terminal
pub fn render_report_summary(store: &ReportStore, top_values: usize) -> String {
    let mut out = String::new();

    out.push_str(&render_header(store));
    out.push_str(&render_counts(store, top_values));
    out.push_str(&render_histograms(store));
    out.push_str(&render_timeline(store));
    out.push_str(&render_happened(store));

    out
}

fn render_header(store: &ReportStore) -> String {
    let traced = store.stack_traces().len();
    let mut out = String::new();
    out.push('\n');
    out.push_str(&"Autopsy Report Summary".bold().to_string());
    out.push('\n');
    out.push_str(RULE);
    out.push_str(&format!("Entries:      {}\n", store.len()));
    out.push_str(&format!("Call sites:   {}\n", store.call_sites().len()));
    out.push_str(&format!("Stack traces: {}\n", traced));
    out.push_str(RULE);
    out
}

fn render_counts(store: &ReportStore, top_values: usize) -> String {
    let mut out = String::new();
    let counts = &store.dashboard().counts;

    if !counts.is_empty() {
        out.push_str(&format!("\n{}\n", "Counts".cyan().bold()));
        for (site, entry) in counts {
            out.push_str(&format!("  {} ({}): {} observations\n", site, entry.function_name, entry.total()));
            for hot in calculate_hot_values(entry, top_values) {
                out.push_str(&format!(
                    "    {:<24} {:>6} ({:.1}%)\n",
                    shorten(&hot.key, 24),
                    hot.count,
                    hot.percentage
                ));
            }
        }
    }
    out
}

fn render_histograms(store: &ReportStore) -> String {
    let mut out = String::new();
    let histograms = &store.dashboard().histograms;

    if !histograms.is_empty() {
        out.push_str(&format!("\n{}\n", "Histograms".cyan().bold()));
        for (site, entry) in histograms {
            let summary = calculate_histogram_summary(entry);
            let line = format!("  {} ({}): {}\n", site, entry.function_name, summary.summary());
            if summary.has_special_values() {
                out.push_str(&line.yellow().to_string());
            } else {
                out.push_str(&line);
            }
        }
    }
    out
}

fn render_timeline(store: &ReportStore) -> String {
    let mut out = String::new();
    let timeline = &store.dashboard().timeline;

    if let (Some(first), Some(last)) = (timeline.first(), timeline.last()) {
        out.push_str(&format!("\n{}\n", "Timeline".cyan().bold()));
        out.push_str(&format!(
            "  {} events over {:.3}s\n",
            timeline.len(),
            last.timestamp - first.timestamp
        ));
        for event in timeline.iter().take(10) {
            out.push_str(&format!(
                "  +{:>9.3}s  {}  ({})\n",
                event.timestamp - first.timestamp,
                event.event_name,
                event.call_site
            ));
        }
        if timeline.len() > 10 {
            out.push_str(&format!("  ... {} more\n", timeline.len() - 10));
        }
    }
    out
}

fn render_happened(store: &ReportStore) -> String {
    let mut out = String::new();
    let happened = &store.dashboard().happened;

    if !happened.is_empty() {
        out.push_str(&format!("\n{}\n", "Happened".cyan().bold()));
        for (site, entry) in happened {
            out.push_str(&format!("  {} ({}): {}x", site, entry.function_name, entry.count));
            if let Some(message) = &entry.message {
                out.push_str(&format!("  \"{}\"", message));
            }
            out.push('\n');
        }
    }
    out
}

/// Render correlation results, one line per mark
pub fn render_reattachments(results: &[Reattachment]) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&"Mark Correlation".bold().to_string());
    out.push('\n');
    out.push_str(RULE);

    for result in results {
        let line = match result.new_index {
            Some(new_index) => format!(
                "✓ {}: {} -> {}",
                result.label, result.old_index, new_index
            )
            .green(),
            None => format!("✗ {}: {} -> not found", result.label, result.old_index).red(),
        };
        out.push_str(&line.to_string());
        out.push('\n');
    }

    let found = results.iter().filter(|r| r.is_found()).count();
    out.push_str(RULE);
    out.push_str(&format!("{}/{} marks re-attached\n", found, results.len()));
    out
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
