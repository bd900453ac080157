//! Autopsy CLI
//!
//! Builds, replays, validates and correlates debug recording reports.

use anyhow::{Context, Result};
use autopsy::commands::{
    display_schema, display_version, execute_build, execute_correlate, execute_live, parse_mark,
    validate_report_file, BuildArgs, CorrelateArgs, LiveArgs,
};
use autopsy::utils::config::{load_config, ReportConfig, DEFAULT_REPORT_PATH};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;
use std::path::PathBuf;

/// Autopsy - debug recording reports
#[derive(Parser, Debug)]
#[command(name = "autopsy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Recorder configuration file (TOML)
    #[arg(short, long, global = true, env = "AUTOPSY_CONFIG")]
    config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a report from JSON-lines observations
    Build {
        /// Observation file, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output path for the report JSON
        #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
        output: PathBuf,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        /// Fail if any observation is rejected
        #[arg(long)]
        strict: bool,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Values shown per count site in the summary
        #[arg(long, default_value = "5")]
        top_values: usize,
    },

    /// Replay live transport messages into a report
    Live {
        /// Message file, one JSON message per line (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output path for the final report JSON
        #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
        output: PathBuf,

        /// Coalescing window in milliseconds (overrides config)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Maximum units per batch (overrides config)
        #[arg(long)]
        max_batch: Option<usize>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Values shown per count site in the summary
        #[arg(long, default_value = "5")]
        top_values: usize,
    },

    /// Re-attach marks from one report to a regenerated report
    Correlate {
        /// Report the marks were made on
        #[arg(long)]
        old: PathBuf,

        /// Regenerated report
        #[arg(long)]
        new: PathBuf,

        /// Marks as `label=log_index` or `log_index`
        #[arg(short, long = "mark", required = true)]
        marks: Vec<String>,

        /// Write results as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ReportConfig::default(),
    };
    debug!("Configuration: {:?}", config);

    // Execute command
    match cli.command {
        Commands::Build {
            input,
            output,
            compact,
            strict,
            summary,
            top_values,
        } => {
            let args = BuildArgs {
                input,
                output,
                compact,
                strict,
                print_summary: summary,
                top_values,
            };
            execute_build(args)?;
        }

        Commands::Live {
            input,
            output,
            window_ms,
            max_batch,
            summary,
            top_values,
        } => {
            let mut live = config.live.clone();
            if let Some(window_ms) = window_ms {
                live.coalesce_window_ms = window_ms;
            }
            if let Some(max_batch) = max_batch {
                if max_batch == 0 {
                    anyhow::bail!("max_batch must be greater than 0");
                }
                live.max_batch = max_batch;
            }

            let args = LiveArgs {
                input,
                output,
                live,
                print_summary: summary,
                top_values,
            };
            execute_live(args)?;
        }

        Commands::Correlate {
            old,
            new,
            marks,
            output,
        } => {
            let marks = marks
                .iter()
                .map(|m| parse_mark(m))
                .collect::<Result<Vec<_>>>()?;
            let args = CorrelateArgs {
                old_report: old,
                new_report: new,
                marks,
                output,
            };
            execute_correlate(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
