//! Configuration and constants for the recorder, the live session and the CLI.

use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Current report document schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default report output path used by the CLI
pub const DEFAULT_REPORT_PATH: &str = "artifacts/autopsy_report.json";

// Capture limits for recorded values
pub const DEFAULT_MAX_STRING_LEN: usize = 1000;
pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const TRUNCATION_SUFFIX: &str = "...";
pub const MAX_DEPTH_MARKER: &str = "<max_depth_reached>";

// Live-mode coalescing window: whichever bound is hit first closes the batch
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_BATCH: usize = 256;

/// Recorder configuration.
///
/// Every field has a default, so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Capture a stack trace for every recorded observation
    pub auto_stack_trace: bool,

    /// Read the source line for each captured frame
    pub capture_code_context: bool,

    /// Strings longer than this are truncated on capture
    pub max_string_len: usize,

    /// Nested values deeper than this are replaced by a marker
    pub max_depth: usize,

    /// Live session tuning
    pub live: LiveConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            auto_stack_trace: true,
            capture_code_context: true,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            live: LiveConfig::default(),
        }
    }
}

/// Live session coalescing bounds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Maximum time a batch stays open after its first unit
    pub coalesce_window_ms: u64,

    /// Maximum number of units applied as one batch
    pub max_batch: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW.as_millis() as u64,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

impl LiveConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

/// Load a recorder configuration from a TOML file
///
/// # Errors
/// * `ConfigError::Io` - If the file cannot be read
/// * `ConfigError::Parse` - If the TOML is invalid
/// * `ConfigError::Invalid` - If a bound is zero
pub fn load_config(path: impl AsRef<Path>) -> Result<ReportConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse a recorder configuration from TOML text
pub fn parse_config(contents: &str) -> Result<ReportConfig, ConfigError> {
    let config: ReportConfig = toml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ReportConfig) -> Result<(), ConfigError> {
    if config.max_depth == 0 {
        return Err(ConfigError::Invalid("max_depth must be greater than 0".to_string()));
    }
    if config.live.max_batch == 0 {
        return Err(ConfigError::Invalid(
            "live.max_batch must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, ReportConfig::default());
        assert!(config.auto_stack_trace);
        assert_eq!(config.live.coalesce_window(), DEFAULT_COALESCE_WINDOW);
    }

    #[test]
    fn test_partial_live_table() {
        let config = parse_config(
            r#"
            auto_stack_trace = false

            [live]
            max_batch = 8
            "#,
        )
        .unwrap();

        assert!(!config.auto_stack_trace);
        assert_eq!(config.live.max_batch, 8);
        assert_eq!(config.live.coalesce_window_ms, 50);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let result = parse_config("[live]\nmax_batch = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = parse_config("auto_stack_trace = maybe");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
