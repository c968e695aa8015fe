//! Aggregator-side access to source channels.
//!
//! The aggregating account is an authenticated user session that can list the
//! channels of a named folder and walk a channel's history newest first. This
//! module defines that seam as two traits and picks the adapter compiled into
//! the binary:
//!
//! | Feature | Adapter | Notes |
//! |---------|---------|-------|
//! | `mtproto` | [`mtproto::MtprotoSource`] | User session over MTProto (`grammers`) |
//! | (none) | [`UnavailableSource`] | Every call fails with [`SourceError::SessionUnavailable`] |
//!
//! The [`collector`] walks histories through these traits only, so tests run
//! against in-memory sources.

pub mod collector;
#[cfg(feature = "mtproto")]
pub mod mtproto;

use crate::config::Config;
use crate::models::{Channel, SourceMessage};
use thiserror::Error;

/// Aggregator-side failure.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No usable authenticated session; fatal for the run.
    #[error("aggregator session unavailable: {0}")]
    SessionUnavailable(String),

    /// The folder listing could not be fetched; fatal for a roster refresh.
    #[error("cannot list folder {folder:?}: {message}")]
    Folder { folder: String, message: String },

    /// One channel's history could not be read; only that channel is skipped.
    #[error("cannot read history of {channel}: {message}")]
    Retrieval { channel: String, message: String },
}

impl SourceError {
    /// `true` when no further channel can be read in this run.
    pub fn is_session_error(&self) -> bool {
        matches!(self, SourceError::SessionUnavailable(_))
    }
}

/// Cursor over one channel's history, newest message first.
pub trait HistoryCursor {
    /// Next older message, or `None` once the history is exhausted.
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, SourceError>;
}

/// Authenticated aggregator session.
pub trait ChannelSource {
    type Cursor: HistoryCursor;

    /// Channels that are members of the folder titled `folder`.
    ///
    /// An unknown or empty folder yields an empty list, not an error.
    async fn folder_channels(&self, folder: &str) -> Result<Vec<Channel>, SourceError>;

    /// Open the history of `channel` in reverse-chronological order.
    async fn open_history(&self, channel: &Channel) -> Result<Self::Cursor, SourceError>;
}

/// Source used when the binary is built without an aggregator adapter.
#[derive(Debug, Default)]
pub struct UnavailableSource;

impl UnavailableSource {
    fn error() -> SourceError {
        SourceError::SessionUnavailable(
            "built without the `mtproto` feature; rebuild with `--features mtproto`".to_string(),
        )
    }
}

/// Cursor type of [`UnavailableSource`]; never constructed.
#[allow(dead_code)]
#[derive(Debug)]
pub struct NoHistory;

impl HistoryCursor for NoHistory {
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, SourceError> {
        Ok(None)
    }
}

impl ChannelSource for UnavailableSource {
    type Cursor = NoHistory;

    async fn folder_channels(&self, _folder: &str) -> Result<Vec<Channel>, SourceError> {
        Err(Self::error())
    }

    async fn open_history(&self, _channel: &Channel) -> Result<NoHistory, SourceError> {
        Err(Self::error())
    }
}

/// The aggregator adapter compiled into this binary.
#[cfg(feature = "mtproto")]
pub type DefaultSource = mtproto::MtprotoSource;

/// The aggregator adapter compiled into this binary.
#[cfg(not(feature = "mtproto"))]
pub type DefaultSource = UnavailableSource;

/// Connect the compiled-in aggregator adapter.
#[cfg(feature = "mtproto")]
pub async fn connect(config: &Config) -> Result<DefaultSource, SourceError> {
    mtproto::MtprotoSource::connect(config).await
}

/// Connect the compiled-in aggregator adapter.
///
/// Without an adapter this succeeds, and the first aggregator call fails.
#[cfg(not(feature = "mtproto"))]
pub async fn connect(_config: &Config) -> Result<DefaultSource, SourceError> {
    tracing::warn!("No aggregator adapter compiled in; channel access will fail");
    Ok(UnavailableSource)
}
