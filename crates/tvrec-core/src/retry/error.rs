//! Remote store error type for retry classification.

use std::time::Duration;
use thiserror::Error;

/// Error returned by a single remote store operation.
/// Kept separate from anyhow so the retry loop can classify it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Operation exceeded the configured transfer timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Network-level failure reported by a non-curl backend.
    #[error("connection: {0}")]
    Connection(String),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Store asked us to wait before trying again.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// Backend cannot perform this operation (e.g. messages on a directory store).
    #[error("unsupported by this store: {0}")]
    Unsupported(&'static str),
    /// Local read/write failed. Not retried.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Transfer stopped because its abort token was cancelled.
    #[error("transfer aborted")]
    Aborted,
    #[error("{0}")]
    Other(String),
}
