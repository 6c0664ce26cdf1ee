//! `StatusSink` over a remote store's text messages.

use async_trait::async_trait;
use std::sync::Arc;

use super::store::RemoteStore;
use crate::job::{ChatId, MessageId};
use crate::retry::StoreError;
use crate::status::{Button, SinkError, SinkUpdate, StatusSink};

pub struct StoreStatusSink {
    store: Arc<dyn RemoteStore>,
}

impl StoreStatusSink {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }
}

fn sink_error(e: StoreError) -> SinkError {
    match e {
        StoreError::RateLimited(wait) => SinkError::RateLimited(wait),
        other => SinkError::Other(other.to_string()),
    }
}

#[async_trait]
impl StatusSink for StoreStatusSink {
    async fn render(
        &self,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SinkError> {
        self.store
            .send_text(chat, reply_to, text, buttons)
            .await
            .map_err(sink_error)
    }

    async fn update(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<SinkUpdate, SinkError> {
        match self.store.edit_text(chat, message, text, buttons).await {
            Ok(true) => Ok(SinkUpdate::Updated),
            Ok(false) => Ok(SinkUpdate::NotModified),
            Err(StoreError::RateLimited(wait)) => Ok(SinkUpdate::RateLimited(wait)),
            Err(e) => Err(sink_error(e)),
        }
    }
}
