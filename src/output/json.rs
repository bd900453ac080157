//! JSON report output writer.
//!
//! Writes report documents to JSON files with proper formatting.

use crate::report::ReportDocument;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write a report document to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `document` - Report document to write
/// * `output_path` - Path to output JSON file
///
/// # Returns
/// Ok if file written successfully
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
///
/// # Example
/// ```ignore
/// let document = store.to_document();
/// write_report(&document, "autopsy_report.json")?;
/// ```
pub fn write_report(
    document: &ReportDocument,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    write_with(document, output_path.as_ref(), true)
}

/// Write a report document as compact JSON (no formatting)
///
/// **Public** - for large live-session dumps
pub fn write_report_compact(
    document: &ReportDocument,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    write_with(document, output_path.as_ref(), false)
}

fn write_with(document: &ReportDocument, output_path: &Path, pretty: bool) -> Result<(), OutputError> {
    info!("Writing report to: {}", output_path.display());

    validate_output_path(output_path)?;

    // Create parent directories if needed
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, document)?;
    } else {
        serde_json::to_writer(writer, document)?;
    }

    info!(
        "Report written successfully ({} entries, {} bytes)",
        document.entry_count(),
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Serialize a report document to a string
///
/// **Public** - used by the `schema` command and tests
pub fn report_to_string(document: &ReportDocument) -> Result<String, OutputError> {
    serde_json::to_string_pretty(document).map_err(OutputError::SerializationFailed)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Calculate file size in bytes
///
/// **Private** - internal utility
fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a report document from a JSON file
///
/// **Public** - used by `validate`, `correlate` and tests
///
/// # Arguments
/// * `input_path` - Path to JSON file
///
/// # Returns
/// Parsed document; schema compatibility is checked when it is loaded
/// into a store
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_report(input_path: impl AsRef<Path>) -> Result<ReportDocument, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading report from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let document: ReportDocument =
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Report loaded: version {}, {} entries",
        document.version,
        document.entry_count()
    );

    Ok(document)
}
