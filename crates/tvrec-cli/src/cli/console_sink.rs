//! Status sink that prints every render to stdout.

use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use tvrec_core::job::{ChatId, MessageId};
use tvrec_core::status::{Button, SinkError, SinkUpdate, StatusSink};

#[derive(Debug, Default)]
pub struct ConsoleStatusSink {
    next_message: AtomicI64,
}

impl ConsoleStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Console rendering of one status message (markdown emphasis stripped).
fn render_block(message: MessageId, text: &str, buttons: &[Button]) -> String {
    let mut out = format!("── [{}] ──\n{}\n", message, text.replace("**", "").replace('`', ""));
    if !buttons.is_empty() {
        let labels: Vec<&str> = buttons.iter().map(|b| b.label.as_str()).collect();
        out.push_str(&format!("   [{}]\n", labels.join("] [")));
    }
    out
}

fn print(block: &str) -> Result<(), SinkError> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(block.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| SinkError::Other(e.to_string()))
}

#[async_trait]
impl StatusSink for ConsoleStatusSink {
    async fn render(
        &self,
        _chat: ChatId,
        _reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SinkError> {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::Relaxed) + 1);
        print(&render_block(id, text, buttons))?;
        Ok(id)
    }

    async fn update(
        &self,
        _chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<SinkUpdate, SinkError> {
        print(&render_block(message, text, buttons))?;
        Ok(SinkUpdate::Updated)
    }
}
