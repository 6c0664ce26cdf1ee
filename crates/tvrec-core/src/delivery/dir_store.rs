//! Remote store backed by a local archive directory.
//!
//! Uploads are chunked copies into `<root>/<chat>/`, each with a JSON
//! sidecar holding the caption and a `<name>.jpg` cover when the artifact
//! has a thumbnail. Text messages are not supported.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::store::{ProgressFn, RemoteStore, StoredRef, UploadRequest};
use crate::job::{ChatId, MessageId};
use crate::retry::StoreError;
use crate::status::Button;

pub struct DirStore {
    root: PathBuf,
    next_id: AtomicI64,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    file_name: &'a str,
    caption: &'a str,
    duration_secs: f64,
    bytes: u64,
    message: MessageId,
    thumbnail: Option<&'a str>,
    forwarded_from: Option<&'a StoredRef>,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chat_dir(&self, chat: ChatId) -> PathBuf {
        self.root.join(chat.to_string())
    }

    fn next_message(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

async fn write_sidecar(path: &Path, sidecar: &Sidecar<'_>) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(sidecar)
        .map_err(|e| StoreError::Other(format!("sidecar: {}", e)))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[async_trait]
impl RemoteStore for DirStore {
    async fn upload(&self, req: UploadRequest, mut progress: ProgressFn) -> Result<StoredRef, StoreError> {
        let dir = self.chat_dir(req.chat);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&req.file_name);

        let mut src = tokio::fs::File::open(&req.path).await?;
        let total = src.metadata().await?.len();
        let mut out = tokio::fs::File::create(&dest).await?;
        let mut buf = vec![0u8; req.chunk_bytes.max(1)];
        let mut done = 0u64;
        loop {
            if req.abort.is_cancelled() {
                drop(out);
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(StoreError::Aborted);
            }
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            done += n as u64;
            progress(done, total);
        }
        out.flush().await?;
        out.sync_all().await?;

        let thumb_name = format!("{}.jpg", req.file_name);
        let thumbnail = match &req.thumbnail {
            Some(thumb) => match tokio::fs::copy(thumb, dir.join(&thumb_name)).await {
                Ok(_) => Some(thumb_name.as_str()),
                Err(e) => {
                    tracing::warn!(path = %thumb.display(), "thumbnail not archived: {}", e);
                    None
                }
            },
            None => None,
        };

        let message = self.next_message();
        let sidecar_path = dir.join(format!("{}.json", req.file_name));
        write_sidecar(
            &sidecar_path,
            &Sidecar {
                file_name: &req.file_name,
                caption: &req.caption,
                duration_secs: req.duration_secs,
                bytes: done,
                message,
                thumbnail,
                forwarded_from: None,
            },
        )
        .await?;
        tracing::debug!(path = %dest.display(), bytes = done, "stored in archive");
        Ok(StoredRef {
            chat: req.chat,
            message,
            location: Some(dest.to_string_lossy().into_owned()),
        })
    }

    async fn forward(
        &self,
        item: &StoredRef,
        to: ChatId,
        _reply_to: Option<MessageId>,
    ) -> Result<StoredRef, StoreError> {
        let location = item
            .location
            .as_deref()
            .ok_or_else(|| StoreError::Other("stored item has no location".to_string()))?;
        let file_name = Path::new(location)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::Other(format!("bad location {}", location)))?;
        let dir = self.chat_dir(to);
        tokio::fs::create_dir_all(&dir).await?;
        let message = self.next_message();
        write_sidecar(
            &dir.join(format!("{}.json", file_name)),
            &Sidecar {
                file_name: &file_name,
                caption: "",
                duration_secs: 0.0,
                bytes: 0,
                message,
                thumbnail: None,
                forwarded_from: Some(item),
            },
        )
        .await?;
        Ok(StoredRef {
            chat: to,
            message,
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
        Err(StoreError::Unsupported("send_text"))
    }

    async fn edit_text(
        &self,
        _chat: ChatId,
        _message: MessageId,
        _text: &str,
        _buttons: &[Button],
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("edit_text"))
    }
}
