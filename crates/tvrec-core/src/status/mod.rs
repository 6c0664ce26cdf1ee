//! Human-readable narration of a job's progress.
//!
//! A `StatusSink` is the capability handed down by the caller (a chat client,
//! the console, ...). Each job wraps it in one `StatusHandle`, which owns the
//! editable progress message and guarantees a single terminal render.

pub mod captions;
mod handle;

pub use handle::StatusHandle;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::job::{ChatId, JobId, MessageId};

/// Inline button attached to a progress message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

/// Prefix of the callback data carried by the cancel button.
pub const CANCEL_BUTTON_PREFIX: &str = "cancel:";

impl Button {
    /// Cancel button for a running capture; `data` is `cancel:<job id>`.
    pub fn cancel(job: &JobId) -> Self {
        Self {
            label: "❌ Cancel".to_string(),
            data: format!("{}{}", CANCEL_BUTTON_PREFIX, job),
        }
    }

    /// Job id carried by a cancel button's callback data.
    pub fn parse_cancel(data: &str) -> Option<JobId> {
        data.strip_prefix(CANCEL_BUTTON_PREFIX)
            .filter(|id| !id.is_empty())
            .map(JobId::from)
    }
}

/// Outcome of editing an existing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkUpdate {
    Updated,
    NotModified,
    /// The sink asks the caller to wait before retrying the same edit.
    RateLimited(Duration),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("status sink rate limited for {0:?}")]
    RateLimited(Duration),
    #[error("status sink: {0}")]
    Other(String),
}

/// Destination for progress messages.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Sends a new message and returns its id.
    async fn render(
        &self,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SinkError>;

    /// Replaces the text (and buttons) of a message sent earlier.
    async fn update(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<SinkUpdate, SinkError>;
}
