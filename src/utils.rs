//! Small helpers for logging and file system checks.

use crate::error::DigestError;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the omitted characters appended. Never splits a UTF-8 sequence.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => {
            let omitted = s[cut..].chars().count();
            format!("{}…(+{omitted} chars)", &s[..cut])
        }
    }
}

/// Ensure the data directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), DigestError> {
    let io_err = |source| DigestError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(path).await.map_err(io_err)?;
    // A small sync write using std fs keeps the error surface simple
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path).map_err(io_err)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Data directory is writable");
    Ok(())
}
