//! Delivery Pipeline: moves finished artifacts to the remote store with
//! throughput-aware progress and at most one delivery in flight per path.
//!
//! Byte transfer to the store is serialized process-wide by a gate of width
//! one; queuing, sampling and progress renders are not, so jobs waiting for
//! the gate keep narrating.

mod dir_store;
mod guard;
mod http_store;
mod notifier;
mod sampler;
mod sink;
mod split;
mod store;

pub use dir_store::DirStore;
pub use guard::{InFlight, InFlightGuard};
pub use http_store::HttpStore;
pub use notifier::run_notifier;
pub use sampler::{TransferSampler, TransferSnapshot, TransferState};
pub use sink::StoreStatusSink;
pub use split::{part_pattern, SplitPlan};
pub use store::{ProgressFn, RemoteStore, StoredRef, UploadRequest};

use anyhow::Context;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::capture::{Artifact, RemoveOnDrop};
use crate::config::{DeliveryConfig, StoreConfig, StoreKind};
use crate::job::ChatId;
use crate::media::{list_sequence, MediaTools};
use crate::retry::{run_with_retry_until, RetryPolicy, StoreError};
use crate::status::{captions, StatusHandle};

/// Opens the store backend selected in config. A directory store without an
/// explicit `dir` archives under the state directory.
pub fn open_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn RemoteStore>> {
    match cfg.kind {
        StoreKind::Dir => {
            let dir = match &cfg.dir {
                Some(dir) => dir.clone(),
                None => crate::logging::state_dir()?.join("store"),
            };
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create store directory {}", dir.display()))?;
            tracing::debug!(dir = %dir.display(), "using directory store");
            Ok(Arc::new(DirStore::new(dir)))
        }
        StoreKind::Http => {
            let base = cfg
                .base_url
                .as_deref()
                .context("store.base_url is required for kind = \"http\"")?;
            tracing::debug!(base, "using http store");
            Ok(Arc::new(HttpStore::new(base, cfg.token.clone())?))
        }
    }
}

/// Width of the transfer gate.
pub const TRANSFER_SLOTS: usize = 1;

/// Capacity of the sampler -> notifier queue.
const SNAPSHOT_QUEUE: usize = 8;

/// How long an aborted upload may take to wind down before the gate is released anyway.
const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery of {} already in progress", .0.display())]
    AlreadyInFlight(PathBuf),
    #[error("artifact {} unreadable: {source}", .path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("split failed: {0}")]
    Split(String),
    #[error("transfer failed after {attempts} attempt(s): {reason}")]
    Transfer { attempts: u32, reason: String },
    #[error("delivery cancelled")]
    Cancelled,
}

/// One unit that reached the store.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub file_name: String,
    pub caption: String,
    pub bytes: u64,
    pub stored: StoredRef,
    /// Copy forwarded to the requester, when the store chat differs.
    pub forwarded: Option<StoredRef>,
    pub attempts: u32,
}

/// Result of delivering one artifact (one entry per transferred part).
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub path: PathBuf,
    pub units: Vec<Delivered>,
}

pub struct DeliveryPipeline {
    store: Arc<dyn RemoteStore>,
    media: Arc<dyn MediaTools>,
    cfg: DeliveryConfig,
    policy: RetryPolicy,
    gate: Semaphore,
    in_flight: InFlight,
}

type DeliverFuture<'a> = Pin<Box<dyn Future<Output = Result<DeliveryReport, DeliveryError>> + Send + 'a>>;

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        media: Arc<dyn MediaTools>,
        cfg: DeliveryConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            media,
            cfg,
            policy,
            gate: Semaphore::new(TRANSFER_SLOTS),
            in_flight: InFlight::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Paths currently being delivered.
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Delivers `artifact` with `caption`, narrating through `status`.
    ///
    /// A second call for a path that is already being delivered fails
    /// immediately with `AlreadyInFlight`. Artifacts above the transfer limit
    /// are split into parts that are delivered one after another and removed
    /// afterwards; the artifact itself is left for the caller to remove.
    pub fn deliver<'a>(
        &'a self,
        artifact: &'a Artifact,
        caption: &'a str,
        status: &'a Arc<StatusHandle>,
        token: &'a CancellationToken,
    ) -> DeliverFuture<'a> {
        Box::pin(async move {
            let _claim = self
                .in_flight
                .try_acquire(&artifact.path)
                .ok_or_else(|| DeliveryError::AlreadyInFlight(artifact.path.clone()))?;

            let size = tokio::fs::metadata(&artifact.path)
                .await
                .map_err(|source| DeliveryError::MissingFile {
                    path: artifact.path.clone(),
                    source,
                })?
                .len();
            if size > self.cfg.max_unit_bytes {
                return self.deliver_split(artifact, size, caption, status, token).await;
            }
            let unit = self.transfer(artifact, size, caption, status, token).await?;
            Ok(DeliveryReport {
                path: artifact.path.clone(),
                units: vec![unit],
            })
        })
    }

    async fn deliver_split(
        &self,
        artifact: &Artifact,
        size: u64,
        caption: &str,
        status: &Arc<StatusHandle>,
        token: &CancellationToken,
    ) -> Result<DeliveryReport, DeliveryError> {
        let file_name = artifact.file_name();
        let parts = match self.split(artifact, size).await {
            Ok(parts) => parts,
            Err(reason) => {
                tracing::warn!(path = %artifact.path.display(), "split failed: {}", reason);
                status
                    .push_until(token, &captions::upload_failed(&file_name, &reason), &[])
                    .await;
                return Err(DeliveryError::Split(reason));
            }
        };
        let _cleanup = RemoveOnDrop::new(parts.iter().map(|p| p.path.clone()).collect());

        let count = parts.len();
        tracing::info!(path = %artifact.path.display(), size, parts = count, "delivering in parts");
        let mut units = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if token.is_cancelled() {
                return Err(DeliveryError::Cancelled);
            }
            let part_caption = captions::part_caption(caption, i + 1, count);
            let report = self.deliver(part, &part_caption, status, token).await?;
            units.extend(report.units);
        }
        Ok(DeliveryReport {
            path: artifact.path.clone(),
            units,
        })
    }

    /// Cuts `artifact` into parts and measures each; partial output is removed on failure.
    async fn split(&self, artifact: &Artifact, size: u64) -> Result<Vec<Artifact>, String> {
        let mut duration = artifact.duration_secs;
        if !(duration.is_finite() && duration > 0.0) {
            duration = self
                .media
                .media_duration(&artifact.path)
                .await
                .map_err(|e| format!("unknown duration: {:#}", e))?;
        }
        let plan = SplitPlan::new(size, duration, self.cfg.part_limit_bytes())
            .ok_or_else(|| format!("cannot plan parts for {} bytes / {:.1}s", size, duration))?;
        let pattern = part_pattern(&artifact.path);
        tracing::debug!(path = %artifact.path.display(), ?plan, "splitting artifact");

        let paths = match self
            .media
            .split(&artifact.path, plan.segment_secs, &pattern)
            .await
        {
            Ok(paths) if paths.len() >= 2 => paths,
            Ok(paths) => {
                drop(RemoveOnDrop::new(paths));
                return Err("split produced fewer than two parts".to_string());
            }
            Err(e) => {
                drop(RemoveOnDrop::new(list_sequence(&pattern).unwrap_or_default()));
                return Err(format!("{:#}", e));
            }
        };

        let mut parts = Vec::with_capacity(paths.len());
        let guard = RemoveOnDrop::new(paths.clone());
        for (index, path) in paths.into_iter().enumerate() {
            let size = tokio::fs::metadata(&path)
                .await
                .map_err(|e| format!("{}: {}", path.display(), e))?
                .len();
            let duration_secs = match self.media.media_duration(&path).await {
                Ok(d) if d.is_finite() && d > 0.0 => d,
                _ => plan.segment_secs as f64,
            };
            parts.push(Artifact {
                path,
                size,
                duration_secs,
                thumbnail: artifact.thumbnail.clone(),
                index,
                quality: artifact.quality,
            });
        }
        if parts.iter().any(|p| p.size >= size) {
            return Err("split did not reduce part size".to_string());
        }
        guard.disarm();
        Ok(parts)
    }

    /// Uploads one unit (retrying per policy) and forwards it to the requester.
    async fn transfer(
        &self,
        artifact: &Artifact,
        size: u64,
        caption: &str,
        status: &Arc<StatusHandle>,
        token: &CancellationToken,
    ) -> Result<Delivered, DeliveryError> {
        let file_name = artifact.file_name();
        let requester = status.chat();
        let destination = if self.cfg.store_chat == 0 {
            requester
        } else {
            ChatId(self.cfg.store_chat)
        };

        if status
            .push_until(token, &captions::upload_waiting(&file_name), &[])
            .await
            .is_none()
        {
            return Err(DeliveryError::Cancelled);
        }

        let (tx, rx) = mpsc::channel(SNAPSHOT_QUEUE);
        let notifier = tokio::spawn(run_notifier(
            rx,
            Arc::clone(status),
            file_name.clone(),
            self.cfg.notify_interval(),
        ));

        let request = UploadRequest {
            path: artifact.path.clone(),
            file_name: file_name.clone(),
            caption: caption.to_string(),
            chat: destination,
            reply_to: None,
            thumbnail: artifact.thumbnail.clone(),
            duration_secs: artifact.duration_secs,
            chunk_bytes: self.cfg.chunk_bytes.max(1),
            timeout: self.cfg.transfer_timeout(),
            abort: CancellationToken::new(),
        };
        let mut attempts = 0u32;
        let attempts_ref = &mut attempts;
        let outcome = run_with_retry_until(&self.policy, token, |attempt| {
            *attempts_ref = attempt;
            let request = UploadRequest {
                abort: token.child_token(),
                ..request.clone()
            };
            let tx = tx.clone();
            let file_name = file_name.clone();
            async move {
                let _slot = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(StoreError::Aborted),
                    permit = self.gate.acquire() => permit
                        .map_err(|_| StoreError::Other("transfer gate closed".to_string()))?,
                };
                tracing::info!(file = %file_name, size, attempt, "upload started");
                let sampler = TransferSampler::new(
                    file_name.clone(),
                    size,
                    tx,
                    self.cfg.speed_sample(),
                    self.cfg.log_interval(),
                );
                self.upload_gated(request, sampler, &file_name).await
            }
        })
        .await;
        drop(tx);
        if token.is_cancelled() {
            notifier.abort();
            tracing::info!(file = %file_name, "delivery cancelled");
            return Err(DeliveryError::Cancelled);
        }
        if let Err(e) = notifier.await {
            tracing::debug!(file = %file_name, "notifier ended abnormally: {}", e);
        }

        let stored = match outcome {
            Ok(stored) => stored,
            Err(e) => {
                let reason = e.last.to_string();
                tracing::warn!(file = %file_name, attempts = e.attempts, "upload failed: {}", reason);
                status
                    .push_until(token, &captions::upload_failed(&file_name, &reason), &[])
                    .await;
                return Err(DeliveryError::Transfer {
                    attempts: e.attempts,
                    reason,
                });
            }
        };
        tracing::info!(file = %file_name, size, chat = %stored.chat, message = %stored.message, "upload finished");

        let forwarded = if destination != requester {
            match self
                .store
                .forward(&stored, requester, status.reply_to())
                .await
            {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!(file = %file_name, chat = %requester, "forward to requester failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        status
            .push_until(token, &captions::upload_succeeded(&file_name), &[])
            .await;
        Ok(Delivered {
            file_name,
            caption: caption.to_string(),
            bytes: size,
            stored,
            forwarded,
            attempts,
        })
    }

    /// Runs one store upload to its end while the caller holds the gate.
    ///
    /// On timeout or cancellation the request's abort token is cancelled and
    /// the upload is still awaited, so the gate is never released while bytes
    /// are in flight. A store that ignores the abort gets `ABORT_GRACE`.
    async fn upload_gated(
        &self,
        request: UploadRequest,
        mut sampler: TransferSampler,
        file_name: &str,
    ) -> Result<StoredRef, StoreError> {
        let abort = request.abort.clone();
        let timeout = self.cfg.transfer_timeout();
        let progress: ProgressFn = Box::new(move |done, total| sampler.on_progress(done, total));
        let upload = self.store.upload(request, progress);
        tokio::pin!(upload);
        let stopped = tokio::select! {
            biased;
            res = &mut upload => return res,
            _ = abort.cancelled() => StoreError::Aborted,
            _ = tokio::time::sleep(timeout), if !timeout.is_zero() => {
                abort.cancel();
                StoreError::Timeout(timeout)
            }
        };
        match tokio::time::timeout(ABORT_GRACE, &mut upload).await {
            Ok(res) => tracing::debug!(file = %file_name, ok = res.is_ok(), "stopped upload returned"),
            Err(_) => tracing::warn!(file = %file_name, grace = ?ABORT_GRACE, "store ignored abort, releasing the gate"),
        }
        Err(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_store_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = StoreConfig {
            dir: Some(tmp.path().join("archive")),
            ..StoreConfig::default()
        };
        assert!(open_store(&cfg).is_ok());
        assert!(tmp.path().join("archive").is_dir());
    }

    #[test]
    fn http_store_needs_base_url() {
        let cfg = StoreConfig {
            kind: StoreKind::Http,
            ..StoreConfig::default()
        };
        let err = open_store(&cfg).err().unwrap();
        assert!(err.to_string().contains("base_url"));
    }
}
