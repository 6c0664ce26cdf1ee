//! Per-job coordination task.

use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{Inner, JobEvent};
use crate::capture::{Artifact, CaptureError, CapturePlan, ProcessSlot, RemoveOnDrop, LABEL_TIME_FORMAT};
use crate::delivery::DeliveryError;
use crate::job::{JobId, JobPhase, JobSpec};
use crate::status::captions::{self, CaptureLabel};
use crate::status::{Button, StatusHandle};

pub(crate) struct JobRun {
    pub spec: JobSpec,
    pub generation: u64,
    pub start_at: Option<DateTime<Local>>,
    pub status: Arc<StatusHandle>,
    pub token: CancellationToken,
    pub process: ProcessSlot,
    pub phase: watch::Sender<JobPhase>,
}

/// Publishes phase transitions of one job.
struct PhaseTracker<'a> {
    id: &'a JobId,
    tx: &'a watch::Sender<JobPhase>,
    inner: &'a Inner,
}

impl PhaseTracker<'_> {
    fn advance(&self, next: JobPhase) -> bool {
        let current = *self.tx.borrow();
        if !current.can_transition_to(next) {
            tracing::warn!(job_id = %self.id, from = current.as_str(), to = next.as_str(), "illegal phase transition ignored");
            return false;
        }
        self.tx.send_replace(next);
        let _ = self.inner.events.send(JobEvent::Phase {
            id: self.id.clone(),
            phase: next,
        });
        tracing::info!(job_id = %self.id, from = current.as_str(), to = next.as_str(), "job phase");
        true
    }
}

pub(crate) async fn run_job(inner: Arc<Inner>, run: JobRun) {
    let id = run.spec.id.clone();
    let tracker = PhaseTracker {
        id: &id,
        tx: &run.phase,
        inner: &inner,
    };
    let terminal = drive(&inner, &run, &tracker).await;

    // The registry must not list the job once its terminal phase is observable.
    inner.registry.retire(&id, run.generation);
    tracker.advance(terminal);
}

async fn drive(inner: &Inner, run: &JobRun, tracker: &PhaseTracker<'_>) -> JobPhase {
    let spec = &run.spec;
    let services = &inner.services;
    let status = &run.status;
    let token = &run.token;

    if let Some(start_at) = run.start_at {
        if !wait_for_start(spec, start_at, status, token).await {
            let at = start_at.format(LABEL_TIME_FORMAT).to_string();
            let label = spec_label(spec, &at);
            status.finish(&captions::recording_cancelled(&label)).await;
            tracing::info!(job_id = %spec.id, "scheduled job cancelled before start");
            return JobPhase::Cancelled;
        }
        tracker.advance(JobPhase::Capturing);
    }

    let dir = &services.config.recordings_dir;
    let plan = CapturePlan::new(spec, dir, &services.config.capture.container_ext, Local::now());
    let label = plan.label();
    let _temp = plan.temp_files();
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::error!(job_id = %spec.id, dir = %dir.display(), "cannot create recordings dir: {}", e);
        status
            .finish(&captions::recording_failed(&label, &format!("recordings directory unavailable: {}", e)))
            .await;
        return JobPhase::Failed;
    }

    let recorded = match services
        .supervisor
        .record(&plan, status, token, &run.process)
        .await
    {
        Ok(r) => r,
        Err(CaptureError::Cancelled) => return JobPhase::Cancelled,
        Err(e) => {
            status
                .finish(&captions::recording_failed(&label, &e.to_string()))
                .await;
            return JobPhase::Failed;
        }
    };

    tracker.advance(JobPhase::Finalizing);
    let finalized = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        r = services.supervisor.finalize(&plan, recorded) => Some(r),
    };
    let artifacts = match finalized {
        None => {
            plan.temp_files().sweep();
            status.finish(&captions::recording_cancelled(&label)).await;
            return JobPhase::Cancelled;
        }
        Some(Ok(artifacts)) => artifacts,
        Some(Err(e)) => {
            tracing::warn!(job_id = %spec.id, "finalize failed: {}", e);
            status
                .finish(&captions::job_failed(&label, &e.to_string()))
                .await;
            return JobPhase::Failed;
        }
    };
    let local = RemoveOnDrop::new(artifacts.iter().flat_map(Artifact::local_files).collect());

    tracker.advance(JobPhase::Delivering);
    let mut delivered = 0usize;
    let mut failures = Vec::new();
    for artifact in &artifacts {
        let file_name = artifact.file_name();
        let caption = captions::artifact_caption(
            &file_name,
            artifact.duration_secs,
            artifact.size,
            artifact.quality.label(),
        );
        match services
            .pipeline
            .deliver(artifact, &caption, status, token)
            .await
        {
            Ok(report) => {
                delivered += report.units.len();
                let _ = inner.events.send(JobEvent::Delivered {
                    id: spec.id.clone(),
                    report,
                });
            }
            Err(DeliveryError::Cancelled) => {
                drop(local);
                status.finish(&captions::recording_cancelled(&label)).await;
                return JobPhase::Cancelled;
            }
            Err(e) => {
                tracing::warn!(job_id = %spec.id, file = %file_name, "delivery failed: {}", e);
                failures.push(format!("{}: {}", file_name, e));
            }
        }
    }

    drop(local);
    if !failures.is_empty() {
        status
            .finish(&captions::job_failed(&label, &failures.join("\n")))
            .await;
        return JobPhase::Failed;
    }
    status
        .finish(&captions::job_completed(&label, delivered))
        .await;
    tracing::info!(job_id = %spec.id, delivered, "job completed");
    JobPhase::Completed
}

/// Sleeps until `start_at`, narrating the schedule. False if cancelled first.
async fn wait_for_start(
    spec: &JobSpec,
    start_at: DateTime<Local>,
    status: &StatusHandle,
    token: &CancellationToken,
) -> bool {
    let at = start_at.format(LABEL_TIME_FORMAT).to_string();
    let label = spec_label(spec, &at);
    if status
        .push_until(token, &captions::scheduled(&label, &at), &[Button::cancel(&spec.id)])
        .await
        .is_none()
    {
        return false;
    }
    let delay = (start_at - Local::now()).to_std().unwrap_or_default();
    tracing::debug!(job_id = %spec.id, ?delay, "waiting for scheduled start");
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn spec_label<'a>(spec: &'a JobSpec, at: &'a str) -> CaptureLabel<'a> {
    CaptureLabel {
        title: &spec.title,
        channel: &spec.channel,
        total_secs: spec.duration_secs,
        started_at: at,
    }
}
