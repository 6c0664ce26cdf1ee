//! Supervised capture run: resolve, launch, narrate, stop.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::plan::LABEL_TIME_FORMAT;
use super::process::terminated_by_sigterm;
use super::{CaptureError, CapturePlan, ProcessSlot};
use crate::config::CaptureConfig;
use crate::media::{list_sequence, CaptureOutput, MediaTools};
use crate::resolver::{resolve_or_fallback, ResolveError, StreamResolver};
use crate::status::{captions, Button, StatusHandle};

/// Raw output of a finished capture, before finalization.
#[derive(Debug, Clone)]
pub struct RecordedCapture {
    /// Output files in sequence order (still carrying the temp prefix).
    pub files: Vec<PathBuf>,
    pub ended_at: DateTime<Local>,
    pub elapsed: Duration,
}

pub struct CaptureSupervisor {
    pub(super) media: Arc<dyn MediaTools>,
    resolver: Arc<dyn StreamResolver>,
    cfg: CaptureConfig,
}

/// How the wait on the capture process ended.
enum Ended {
    Exited {
        status: ExitStatus,
        stop_requested: bool,
    },
    Cancelled,
}

impl CaptureSupervisor {
    pub fn new(
        media: Arc<dyn MediaTools>,
        resolver: Arc<dyn StreamResolver>,
        cfg: CaptureConfig,
    ) -> Self {
        Self {
            media,
            resolver,
            cfg,
        }
    }

    /// Runs the capture described by `plan` until it ends naturally, fails or
    /// `token` is cancelled.
    ///
    /// On cancellation the process is terminated, a "cancelled" render is
    /// pushed as the job's final status, temp files are removed and
    /// `CaptureError::Cancelled` is returned. On failure temp files are removed
    /// and the error is returned for the caller to narrate.
    pub async fn record(
        &self,
        plan: &CapturePlan,
        status: &StatusHandle,
        token: &CancellationToken,
        slot: &ProcessSlot,
    ) -> Result<RecordedCapture, CaptureError> {
        let res = self.record_inner(plan, status, token, slot).await;
        match &res {
            Ok(_) => {}
            Err(CaptureError::Cancelled) => {
                // Cleanup first: the terminal render may sit in a rate-limit wait.
                plan.temp_files().sweep();
                tracing::info!(job_id = %plan.job, "capture cancelled");
                status.finish(&captions::recording_cancelled(&plan.label())).await;
            }
            Err(e) => {
                plan.temp_files().sweep();
                tracing::warn!(job_id = %plan.job, "capture failed: {}", e);
            }
        }
        res
    }

    async fn record_inner(
        &self,
        plan: &CapturePlan,
        status: &StatusHandle,
        token: &CancellationToken,
        slot: &ProcessSlot,
    ) -> Result<RecordedCapture, CaptureError> {
        let label = plan.label();
        let buttons = [Button::cancel(&plan.job)];
        if status
            .push_until(token, &captions::recording_started(&label), &buttons)
            .await
            .is_none()
        {
            return Err(CaptureError::Cancelled);
        }

        let input = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CaptureError::Cancelled),
            r = resolve_or_fallback(self.resolver.as_ref(), &plan.stream_ref) => r,
        };
        let input = input.map_err(|e| match e {
            ResolveError::Invalid(r) | ResolveError::Transport(r) => CaptureError::InvalidReference(r),
        })?;

        let args = plan.capture_args(input);
        let mut child = self
            .media
            .capture_command(&args)
            .spawn()
            .map_err(CaptureError::Launch)?;
        if let Some(pid) = child.id() {
            slot.attach(pid);
        }
        tracing::info!(
            job_id = %plan.job,
            pid = ?child.id(),
            duration_secs = plan.duration_secs,
            segment_secs = ?plan.segment_secs,
            "capture started"
        );

        let started = Instant::now();
        let ended = self
            .supervise(plan, &mut child, status, token, slot, started)
            .await;
        let elapsed = started.elapsed();

        let (exit, stop_requested) = match ended {
            Ended::Cancelled => {
                self.stop(&mut child, slot).await;
                return Err(CaptureError::Cancelled);
            }
            Ended::Exited {
                status,
                stop_requested,
            } => (status, stop_requested),
        };
        slot.clear();

        let terminated = terminated_by_sigterm(&exit);
        tracing::debug!(job_id = %plan.job, status = %exit, ?elapsed, stop_requested, "capture process exited");
        if !(exit.success() || terminated || stop_requested) {
            let reason = format!("exited with {}", exit);
            let snapshot = captions::recording_progress(
                &label,
                elapsed,
                Some(&format!("Recording failed (capture process {})", reason)),
            );
            status.push_until(token, &snapshot, &[]).await;
            return Err(CaptureError::AbnormalExit(reason));
        }
        if plan.is_unbounded() && !terminated {
            let snapshot =
                captions::recording_progress(&label, elapsed, Some("Stream ended unexpectedly"));
            status.push_until(token, &snapshot, &[]).await;
            return Err(CaptureError::StreamEnded);
        }

        let files = match plan.output() {
            CaptureOutput::Single(path) => {
                if tokio::fs::try_exists(&path).await? {
                    vec![path]
                } else {
                    Vec::new()
                }
            }
            CaptureOutput::Segmented { pattern, .. } => list_sequence(&pattern)?,
        };
        if files.is_empty() {
            return Err(CaptureError::NoOutput);
        }

        let ended_at = Local::now();
        let done = captions::recording_completed(&label, &ended_at.format(LABEL_TIME_FORMAT).to_string());
        status.push_until(token, &done, &[]).await;
        tracing::info!(job_id = %plan.job, files = files.len(), ?elapsed, "capture finished");
        Ok(RecordedCapture {
            files,
            ended_at,
            elapsed,
        })
    }

    /// Waits for the process while narrating progress every `progress_interval`.
    /// A bounded capture still running `stop_grace` after its duration is asked to stop.
    async fn supervise(
        &self,
        plan: &CapturePlan,
        child: &mut Child,
        status: &StatusHandle,
        token: &CancellationToken,
        slot: &ProcessSlot,
        started: Instant,
    ) -> Ended {
        let label = plan.label();
        let buttons = [Button::cancel(&plan.job)];
        let interval = self.cfg.progress_interval();
        let mut ticker = tokio::time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stop_at = (!plan.is_unbounded())
            .then(|| started + Duration::from_secs(plan.duration_secs) + self.cfg.stop_grace());
        let mut stop_requested = false;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ended::Cancelled,
                res = child.wait() => {
                    return match res {
                        Ok(status) => Ended::Exited { status, stop_requested },
                        Err(e) => {
                            tracing::warn!(job_id = %plan.job, "waiting on capture process failed: {}", e);
                            self.stop(child, slot).await;
                            match child.try_wait() {
                                Ok(Some(status)) => Ended::Exited { status, stop_requested },
                                _ => Ended::Cancelled,
                            }
                        }
                    };
                }
                _ = sleep_until_opt(stop_at), if !stop_requested => {
                    tracing::warn!(job_id = %plan.job, "capture overran its duration, stopping");
                    stop_requested = true;
                    if !slot.terminate() {
                        let _ = child.start_kill();
                    }
                }
                _ = ticker.tick() => {
                    let text = captions::recording_progress(&label, started.elapsed(), None);
                    if status.push_until(token, &text, &buttons).await.is_none() {
                        return Ended::Cancelled;
                    }
                }
            }
        }
    }

    /// Terminates the process, killing it if it outlives `terminate_grace`.
    async fn stop(&self, child: &mut Child, slot: &ProcessSlot) {
        if !slot.terminate() {
            let _ = child.start_kill();
        }
        match tokio::time::timeout(self.cfg.terminate_grace(), child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(pid = ?child.id(), "capture process ignored SIGTERM, killing");
                let _ = child.kill().await;
            }
        }
        slot.clear();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
