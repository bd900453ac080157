//! Source line lookup for frame code context.
//!
//! Files are read once and kept for the life of the process; a file that
//! cannot be read is remembered as missing.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, OnceLock};

type LineCache = Mutex<HashMap<String, Option<Arc<Vec<String>>>>>;

fn cache() -> &'static LineCache {
    static CACHE: OnceLock<LineCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Trimmed text of a 1-based line, or an empty string
pub fn line_at(filename: &str, line_number: u32) -> String {
    let lines = {
        let mut cache = cache().lock();
        cache
            .entry(filename.to_string())
            .or_insert_with(|| load(filename))
            .clone()
    };

    let index = (line_number as usize).checked_sub(1);
    match (lines, index) {
        (Some(lines), Some(index)) => lines
            .get(index)
            .map(|l| l.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn load(filename: &str) -> Option<Arc<Vec<String>>> {
    match fs::read_to_string(filename) {
        Ok(text) => Some(Arc::new(text.lines().map(str::to_string).collect())),
        Err(e) => {
            debug!("No source for {}: {}", filename, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_line_at_reads_and_trims() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "fn main() {{").unwrap();
        writeln!(file, "    let total = 3;").unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert_eq!(line_at(&path, 2), "let total = 3;");
        assert_eq!(line_at(&path, 0), "");
        assert_eq!(line_at(&path, 99), "");
    }

    #[test]
    fn test_missing_file_is_empty() {
        assert_eq!(line_at("/definitely/not/here.rs", 1), "");
    }
}
