use crate::correlate::Mark;
use crate::utils::config::{LiveConfig, DEFAULT_REPORT_PATH};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Arguments for the build command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct BuildArgs {
    /// JSON-lines observation file
    pub input: PathBuf,

    /// Output path for the report JSON
    pub output: PathBuf,

    /// Write compact JSON
    pub compact: bool,

    /// Fail if any observation line is rejected
    pub strict: bool,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Number of top values shown per count site in the summary
    pub top_values: usize,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from("observations.jsonl"),
            output: PathBuf::from(DEFAULT_REPORT_PATH),
            compact: false,
            strict: false,
            print_summary: false,
            top_values: 5,
        }
    }
}

/// Arguments for the live command
#[derive(Debug, Clone)]
pub struct LiveArgs {
    /// JSON-lines transport messages; stdin when `None`
    pub input: Option<PathBuf>,

    /// Output path for the final report JSON
    pub output: PathBuf,

    /// Coalescing bounds
    pub live: LiveConfig,

    pub print_summary: bool,
    pub top_values: usize,
}

/// Arguments for the correlate command
#[derive(Debug, Clone)]
pub struct CorrelateArgs {
    /// Report the marks were made on
    pub old_report: PathBuf,

    /// Regenerated report
    pub new_report: PathBuf,

    pub marks: Vec<Mark>,

    /// Write the reattachments as JSON
    pub output: Option<PathBuf>,
}

/// Parse a mark given as `label=log_index` or a bare `log_index`
pub fn parse_mark(text: &str) -> Result<Mark> {
    let (label, index) = match text.split_once('=') {
        Some((label, index)) => (label.trim(), index.trim()),
        None => (text.trim(), text.trim()),
    };
    let log_index: u64 = index
        .parse()
        .with_context(|| format!("Invalid log index in mark '{}'", text))?;
    if label.is_empty() {
        anyhow::bail!("Mark label cannot be empty: '{}'", text);
    }
    Ok(Mark::new(label, log_index))
}
