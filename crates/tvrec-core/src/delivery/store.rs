//! Remote store seam: where delivered artifacts and status messages go.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job::{ChatId, MessageId};
use crate::retry::StoreError;
use crate::status::Button;

/// Per-chunk progress callback: `(bytes transferred so far, total bytes)`.
/// Invoked on the transfer path; it must not block.
pub type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

/// One upload to the store.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub file_name: String,
    pub caption: String,
    /// Chat the upload lands in.
    pub chat: ChatId,
    pub reply_to: Option<MessageId>,
    pub thumbnail: Option<PathBuf>,
    pub duration_secs: f64,
    /// Upper bound of each chunk handed to the transport.
    pub chunk_bytes: usize,
    /// Overall limit for the transfer; zero means none.
    pub timeout: Duration,
    /// Once cancelled the backend stops sending and returns `StoreError::Aborted`.
    /// `upload` must not return while bytes for this request are still in flight.
    pub abort: CancellationToken,
}

/// Reference to an item held by the store. Forwarding it never re-sends bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRef {
    pub chat: ChatId,
    pub message: MessageId,
    #[serde(default)]
    pub location: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upload(&self, req: UploadRequest, progress: ProgressFn) -> Result<StoredRef, StoreError>;

    /// Re-posts a stored item into another chat by reference.
    async fn forward(
        &self,
        item: &StoredRef,
        to: ChatId,
        reply_to: Option<MessageId>,
    ) -> Result<StoredRef, StoreError>;

    async fn send_text(
        &self,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, StoreError>;

    /// Returns false when the message already had this content.
    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<bool, StoreError>;
}
