//! Per-job status message with change detection, rate-limit backoff and a
//! single terminal render.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Button, SinkError, SinkUpdate, StatusSink};
use crate::job::{ChatId, MessageId};

/// Attempts for one render/edit when the sink keeps answering "rate limited".
const RATE_LIMIT_ATTEMPTS: u32 = 3;

#[derive(Default)]
struct HandleState {
    message: Option<MessageId>,
    last_text: Option<String>,
    finished: bool,
}

/// Editable progress message for one job.
///
/// Pushes are serialized; identical text is never re-sent. Transient sink
/// errors are logged and swallowed so narration degrades instead of failing
/// the job. After `finish` every further push is ignored.
pub struct StatusHandle {
    sink: Arc<dyn StatusSink>,
    chat: ChatId,
    reply_to: Option<MessageId>,
    state: Mutex<HandleState>,
}

impl StatusHandle {
    pub fn new(sink: Arc<dyn StatusSink>, chat: ChatId, reply_to: Option<MessageId>) -> Self {
        Self {
            sink,
            chat,
            reply_to,
            state: Mutex::new(HandleState::default()),
        }
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Request message the narration replies to.
    pub fn reply_to(&self) -> Option<MessageId> {
        self.reply_to
    }

    pub async fn message_id(&self) -> Option<MessageId> {
        self.state.lock().await.message
    }

    pub async fn is_finished(&self) -> bool {
        self.state.lock().await.finished
    }

    /// Pushes an intermediate snapshot. Returns true if the sink accepted new text.
    pub async fn push(&self, text: &str, buttons: &[Button]) -> bool {
        let mut state = self.state.lock().await;
        if state.finished {
            return false;
        }
        self.send(&mut state, text, buttons).await
    }

    /// Like `push`, but abandons the send (including any rate-limit wait) once
    /// `token` is cancelled. `None` means it was abandoned.
    pub async fn push_until(
        &self,
        token: &CancellationToken,
        text: &str,
        buttons: &[Button],
    ) -> Option<bool> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            sent = self.push(text, buttons) => Some(sent),
        }
    }

    /// Pushes the terminal render. Only the first call has any effect; returns
    /// false for every later call.
    pub async fn finish(&self, text: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.finished {
            return false;
        }
        state.finished = true;
        // The terminal render is always sent, even if it repeats the last snapshot,
        // so that buttons are removed.
        state.last_text = None;
        self.send(&mut state, text, &[]).await;
        true
    }

    async fn send(&self, state: &mut HandleState, text: &str, buttons: &[Button]) -> bool {
        if state.last_text.as_deref() == Some(text) {
            return false;
        }
        let sent = match state.message {
            None => self.render_with_backoff(text, buttons).await.map(|id| {
                state.message = Some(id);
                true
            }),
            Some(id) => self.update_with_backoff(id, text, buttons).await,
        };
        match sent {
            Ok(changed) => {
                state.last_text = Some(text.to_string());
                changed
            }
            Err(e) => {
                tracing::warn!(chat = %self.chat, "status update failed: {}", e);
                false
            }
        }
    }

    async fn render_with_backoff(
        &self,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SinkError> {
        let mut attempt = 1;
        loop {
            match self.sink.render(self.chat, self.reply_to, text, buttons).await {
                Err(SinkError::RateLimited(wait)) if attempt < RATE_LIMIT_ATTEMPTS => {
                    tracing::debug!(chat = %self.chat, ?wait, "status render rate limited");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn update_with_backoff(
        &self,
        id: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<bool, SinkError> {
        let mut attempt = 1;
        loop {
            let res = self.sink.update(self.chat, id, text, buttons).await;
            let wait = match res {
                Ok(SinkUpdate::Updated) => return Ok(true),
                Ok(SinkUpdate::NotModified) => return Ok(false),
                Ok(SinkUpdate::RateLimited(wait)) | Err(SinkError::RateLimited(wait)) => wait,
                Err(e) => return Err(e),
            };
            if attempt >= RATE_LIMIT_ATTEMPTS {
                return Err(SinkError::RateLimited(wait));
            }
            tracing::debug!(chat = %self.chat, message = %id, ?wait, "status edit rate limited");
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
