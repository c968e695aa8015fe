//! Durable state: the subscriber roster, the channel roster and append-only logs.
//!
//! All files are UTF-8 text and meant to be readable by an operator.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! ├── subscribers.json                          # { "subscribers": [...] }
//! ├── subscribers.json.20240610-080000.bak      # backup taken before each save
//! ├── channels.json                             # { "channels": [...] }
//! ├── sent_summaries.log                        # every generated digest
//! ├── sent_messages.log                         # one line per delivered chunk
//! └── user_messages.log                         # raw inbound bot messages
//! ```
//!
//! Files are read-modify-written with no locking. Only one pipeline instance
//! may run at a time; concurrent invocations are not safe.

pub mod channels;
pub mod logs;
pub mod subscribers;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reading or writing a persisted file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a JSON document, returning `None` when the file does not exist.
pub(crate) async fn read_json<T>(path: &Path) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::parse(path, e))
}

/// Write a JSON document (pretty, UTF-8), creating parent directories.
pub(crate) async fn write_json<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: serde::Serialize,
{
    let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::parse(path, e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| StoreError::io(path, e))
}
