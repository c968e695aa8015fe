//! Append-only audit logs.
//!
//! These files are never read back by the pipeline. A failed append is logged
//! by the caller and never interrupts delivery.

use crate::models::{ADDED_AT_FORMAT, DeliveryRecord, InboundMessage};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

const SUMMARY_BANNER_WIDTH: usize = 80;

/// Append `text` to `path`, creating the file (and its directory) if needed.
pub async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// Log of every generated digest.
#[derive(Debug, Clone)]
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn append(&self, digest: &str, at: DateTime<Utc>) -> std::io::Result<()> {
        append(&self.path, &summary_entry(digest, at)).await
    }
}

fn summary_entry(digest: &str, at: DateTime<Utc>) -> String {
    let banner = "=".repeat(SUMMARY_BANNER_WIDTH);
    format!(
        "\n{banner}\nSent at: {} UTC\n{banner}\n{digest}\n",
        at.format(ADDED_AT_FORMAT)
    )
}

/// Log of delivered chunks, one [`DeliveryRecord`] per line.
#[derive(Debug, Clone)]
pub struct SentLog {
    path: PathBuf,
}

impl SentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, record: &DeliveryRecord) -> std::io::Result<()> {
        append(&self.path, &format!("{}\n", record.to_log_line())).await
    }
}

/// Raw log of private messages the bot received.
#[derive(Debug, Clone)]
pub struct InboundLog {
    path: PathBuf,
}

impl InboundLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn record(&self, message: &InboundMessage) -> std::io::Result<()> {
        append(&self.path, &format!("{}\n", message.to_log_line())).await
    }
}
