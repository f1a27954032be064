//! Config file parsing.

use crate::error::{ConfigError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One `key value` directive read from a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Flag name
    pub key: String,
    /// Raw value; `true` when the line held only a key
    pub value: String,
    /// File the entry was read from
    pub source_path: PathBuf,
    /// 1-based line number within the file
    pub line_number: usize,
}

/// Read every entry from the config file at `path`.
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be opened or read.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<ConfigEntry>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reader(BufReader::new(file), path)
}

/// Read every entry from `reader`, attributing them to `source_path`.
///
/// Blank lines and lines starting with `#` are skipped. Each remaining line is
/// split at the first run of whitespace into key and value.
///
/// # Errors
///
/// Returns `ConfigError::Io` if a read fails part way through. No entries are
/// returned in that case.
pub fn parse_reader<R: BufRead>(reader: R, source_path: &Path) -> Result<Vec<ConfigEntry>> {
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ConfigError::Io {
            path: source_path.to_path_buf(),
            source,
        })?;
        if let Some((key, value)) = parse_line(&line) {
            entries.push(ConfigEntry {
                key,
                value,
                source_path: source_path.to_path_buf(),
                line_number: index + 1,
            });
        }
    }
    Ok(entries)
}

/// Split a single config line into key and value.
///
/// Returns `None` for blank and comment lines.
///
/// ```rust
/// use hotswap_flags::core::parse_line;
///
/// assert_eq!(parse_line("  port   8080 "), Some(("port".into(), "8080".into())));
/// assert_eq!(parse_line("verbose"), Some(("verbose".into(), "true".into())));
/// assert_eq!(parse_line("# comment"), None);
/// ```
pub fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((key, value)) => Some((key.to_string(), value.trim_start().to_string())),
        // A bare key is a boolean switch
        None => Some((line.to_string(), "true".to_string())),
    }
}
