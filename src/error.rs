//! Run-level error type.
//!
//! Every variant is fatal for the current run: the orchestrator stops, `main`
//! logs the diagnostic and exits nonzero. Per-recipient and per-channel
//! failures never reach this type; they are handled where they occur.

use crate::sources::SourceError;
use crate::storage::StoreError;
use crate::transport::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    /// A credential required by the selected run mode is not configured.
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Settings that are present but unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Aggregator session or folder lookup failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The single completion request failed; not retried.
    #[error("completion request failed: {0}")]
    Completion(String),

    /// Subscriber store or channel roster could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bot-side call outside the per-recipient loop (backfill) failed.
    #[error("bot transport failed: {0}")]
    Transport(#[from] DeliveryError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
