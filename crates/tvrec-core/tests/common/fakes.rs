//! In-process stand-ins for the capture tool, the remote store and the chat.
//!
//! Fake media is written at `BYTES_PER_SEC` so probing a file's duration is
//! just its size divided by that rate.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tvrec_core::delivery::{ProgressFn, RemoteStore, StoredRef, UploadRequest};
use tvrec_core::job::{ChatId, MessageId};
use tvrec_core::media::{CaptureArgs, CaptureOutput, MediaTools, Quality, SEQUENCE_PLACEHOLDER};
use tvrec_core::resolver::{ResolveError, StreamResolver};
use tvrec_core::retry::StoreError;
use tvrec_core::status::{Button, SinkError, SinkUpdate, StatusSink};

pub const BYTES_PER_SEC: u64 = 10;

fn sequence_path(pattern: &Path, index: usize) -> PathBuf {
    let name = pattern
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .replace(SEQUENCE_PLACEHOLDER, &format!("{:03}", index));
    pattern.with_file_name(name)
}

fn quote(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Capture "process" that writes its output up front and then sleeps.
#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    /// How long an unbounded capture runs before the stream "ends" (None: forever).
    pub unbounded_lifetime: Option<f64>,
    /// Exit code of the capture process.
    pub exit_code: i32,
}

impl FakeMedia {
    fn script(&self, args: &CaptureArgs) -> String {
        let total = args.duration_secs.unwrap_or(60);
        let mut writes = Vec::new();
        match &args.output {
            CaptureOutput::Single(path) => {
                writes.push(format!(
                    "head -c {} /dev/zero > {}",
                    total * BYTES_PER_SEC,
                    quote(path)
                ));
            }
            CaptureOutput::Segmented {
                pattern,
                segment_secs,
            } => {
                let count = total.div_ceil(*segment_secs).max(1);
                for i in 0..count {
                    let secs = (*segment_secs).min(total - i * segment_secs);
                    writes.push(format!(
                        "head -c {} /dev/zero > {}",
                        secs * BYTES_PER_SEC,
                        quote(&sequence_path(pattern, i as usize))
                    ));
                }
            }
        }
        let run_for = match args.duration_secs {
            Some(d) => format!("exec sleep {}", d),
            None => match self.unbounded_lifetime {
                Some(secs) => format!("exec sleep {}", secs),
                None => "exec sleep 3600".to_string(),
            },
        };
        if self.exit_code == 0 {
            format!("{}; {}", writes.join("; "), run_for)
        } else {
            format!("{}; exit {}", writes.join("; "), self.exit_code)
        }
    }
}

#[async_trait]
impl MediaTools for FakeMedia {
    fn capture_command(&self, args: &CaptureArgs) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(self.script(args));
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn extract_thumbnail(&self, _src: &Path, dst: &Path) -> Result<()> {
        tokio::fs::write(dst, b"jpeg").await?;
        Ok(())
    }

    async fn media_duration(&self, path: &Path) -> Result<f64> {
        let size = tokio::fs::metadata(path).await?.len();
        Ok(size as f64 / BYTES_PER_SEC as f64)
    }

    async fn media_quality(&self, _path: &Path) -> Result<Quality> {
        Ok(Quality::Hd)
    }

    async fn split(&self, src: &Path, segment_secs: u64, pattern: &Path) -> Result<Vec<PathBuf>> {
        let data = tokio::fs::read(src).await?;
        let chunk = (segment_secs * BYTES_PER_SEC).max(1) as usize;
        let mut out = Vec::new();
        for (i, part) in data.chunks(chunk).enumerate() {
            let path = sequence_path(pattern, i);
            tokio::fs::write(&path, part).await?;
            out.push(path);
        }
        Ok(out)
    }
}

/// Resolver that hands the reference back unchanged.
pub struct PassThrough;

#[async_trait]
impl StreamResolver for PassThrough {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError> {
        Ok(reference.to_string())
    }
}

/// What the store saw for one successful upload.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub file_name: String,
    pub caption: String,
    pub chat: ChatId,
    pub bytes: u64,
    pub duration_secs: f64,
    /// Contents of the cover image sent along with the video.
    pub thumbnail: Option<Vec<u8>>,
}

/// Store that keeps uploads in memory.
#[derive(Default)]
pub struct FakeStore {
    /// Delay per chunk.
    pub chunk_latency: Duration,
    /// The first this-many uploads fail with a connection error.
    pub fail_first: AtomicUsize,
    pub uploads: Mutex<Vec<UploadRecord>>,
    pub forwards: Mutex<Vec<(StoredRef, ChatId)>>,
    pub attempts: AtomicUsize,
    /// Uploads that stopped because their abort token fired.
    pub aborted: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    next_message: AtomicI64,
}

impl FakeStore {
    pub fn with_latency(chunk_latency: Duration) -> Self {
        Self {
            chunk_latency,
            ..Self::default()
        }
    }

    pub fn failing(times: usize) -> Self {
        let store = Self::default();
        store.fail_first.store(times, Ordering::SeqCst);
        store
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }

    async fn send_chunks(
        &self,
        req: &UploadRequest,
        data: &[u8],
        progress: &mut ProgressFn,
    ) -> Result<StoredRef, StoreError> {
        let total = data.len() as u64;
        let mut sent = 0u64;
        for chunk in data.chunks(req.chunk_bytes.max(1)) {
            if !self.chunk_latency.is_zero() {
                tokio::select! {
                    _ = req.abort.cancelled() => {}
                    _ = tokio::time::sleep(self.chunk_latency) => {}
                }
            }
            if req.abort.is_cancelled() {
                self.aborted.fetch_add(1, Ordering::SeqCst);
                return Err(StoreError::Aborted);
            }
            sent += chunk.len() as u64;
            progress(sent, total);
        }
        let thumbnail = match &req.thumbnail {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => None,
        };
        let message = MessageId(self.next_message.fetch_add(1, Ordering::SeqCst) + 1);
        self.uploads.lock().unwrap().push(UploadRecord {
            file_name: req.file_name.clone(),
            caption: req.caption.clone(),
            chat: req.chat,
            bytes: total,
            duration_secs: req.duration_secs,
            thumbnail,
        });
        Ok(StoredRef {
            chat: req.chat,
            message,
            location: None,
        })
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn upload(&self, req: UploadRequest, mut progress: ProgressFn) -> Result<StoredRef, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Connection("connection reset".to_string()));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let data = tokio::fs::read(&req.path).await;
        let result = match data {
            Ok(data) => self.send_chunks(&req, &data, &mut progress).await,
            Err(e) => Err(StoreError::Io(e)),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn forward(
        &self,
        item: &StoredRef,
        to: ChatId,
        _reply_to: Option<MessageId>,
    ) -> Result<StoredRef, StoreError> {
        self.forwards.lock().unwrap().push((item.clone(), to));
        Ok(StoredRef {
            chat: to,
            message: item.message,
            location: item.location.clone(),
        })
    }

    async fn send_text(
        &self,
        _chat: ChatId,
        _reply_to: Option<MessageId>,
        _text: &str,
        _buttons: &[Button],
    ) -> Result<MessageId, StoreError> {
        Err(StoreError::Unsupported("text messages"))
    }

    async fn edit_text(
        &self,
        _chat: ChatId,
        _message: MessageId,
        _text: &str,
        _buttons: &[Button],
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("text messages"))
    }
}

/// Status sink that remembers every text it was given.
#[derive(Default)]
pub struct RecordingSink {
    pub texts: Mutex<Vec<String>>,
    next_message: AtomicI64,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.contains(needle))
            .count()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn render(
        &self,
        _chat: ChatId,
        _reply_to: Option<MessageId>,
        text: &str,
        _buttons: &[Button],
    ) -> Result<MessageId, SinkError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(MessageId(self.next_message.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn update(
        &self,
        _chat: ChatId,
        _message: MessageId,
        text: &str,
        _buttons: &[Button],
    ) -> Result<SinkUpdate, SinkError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(SinkUpdate::Updated)
    }
}

/// Recording sink whose first edit answers with a long flood wait.
pub struct FloodWaitSink {
    pub recorded: RecordingSink,
    wait: Duration,
    flooded: AtomicBool,
}

impl FloodWaitSink {
    pub fn new(wait: Duration) -> Self {
        Self {
            recorded: RecordingSink::default(),
            wait,
            flooded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StatusSink for FloodWaitSink {
    async fn render(
        &self,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SinkError> {
        self.recorded.render(chat, reply_to, text, buttons).await
    }

    async fn update(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<SinkUpdate, SinkError> {
        if !self.flooded.swap(true, Ordering::SeqCst) {
            return Ok(SinkUpdate::RateLimited(self.wait));
        }
        self.recorded.update(chat, message, text, buttons).await
    }
}
