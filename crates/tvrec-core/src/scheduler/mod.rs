//! Job Registry / Scheduler: accepts capture jobs, runs one coordination
//! task per job and answers cancel and status queries.

mod coordinate;
mod registry;

pub use registry::JobRegistry;

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::capture::{CaptureSupervisor, ProcessSlot};
use crate::config::TvrecConfig;
use crate::delivery::{DeliveryPipeline, DeliveryReport, RemoteStore};
use crate::job::{JobId, JobPhase, JobSpec, JobSummary, OwnerId};
use crate::media::MediaTools;
use crate::resolver::StreamResolver;
use crate::retry::RetryPolicy;
use crate::status::{StatusHandle, StatusSink};
use coordinate::{run_job, JobRun};
use registry::JobEntry;

/// Capacity of the job event broadcast.
const EVENT_QUEUE: usize = 64;

/// Extra time a cancelled job gets for cleanup on top of the process terminate grace.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("job {0} is already registered")]
    Duplicate(JobId),
    #[error("invalid job: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("{requester} may not cancel job {job}")]
    Unauthorized { job: JobId, requester: OwnerId },
}

/// Lifecycle notifications for status tooling.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Phase { id: JobId, phase: JobPhase },
    Delivered { id: JobId, report: DeliveryReport },
}

/// Everything a job needs, constructed once at startup.
pub struct Services {
    pub config: TvrecConfig,
    pub supervisor: CaptureSupervisor,
    pub pipeline: DeliveryPipeline,
}

impl Services {
    pub fn new(
        config: TvrecConfig,
        media: Arc<dyn MediaTools>,
        resolver: Arc<dyn StreamResolver>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let policy = config
            .retry
            .as_ref()
            .map(RetryPolicy::from_config)
            .unwrap_or_default();
        let supervisor = CaptureSupervisor::new(Arc::clone(&media), resolver, config.capture.clone());
        let pipeline = DeliveryPipeline::new(store, media, config.delivery.clone(), policy);
        Self {
            config,
            supervisor,
            pipeline,
        }
    }
}

/// Handle on a submitted job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: JobId,
    pub phase: watch::Receiver<JobPhase>,
}

impl JobTicket {
    pub fn current(&self) -> JobPhase {
        *self.phase.borrow()
    }

    /// Resolves once the job reached a terminal phase.
    pub async fn wait(mut self) -> JobPhase {
        loop {
            let phase = *self.phase.borrow_and_update();
            if phase.is_terminal() {
                return phase;
            }
            if self.phase.changed().await.is_err() {
                return *self.phase.borrow();
            }
        }
    }
}

pub(crate) struct Inner {
    pub registry: JobRegistry,
    pub services: Services,
    pub events: broadcast::Sender<JobEvent>,
}

/// Owns the job registry; cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(services: Services) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        Self {
            inner: Arc::new(Inner {
                registry: JobRegistry::new(),
                services,
                events,
            }),
        }
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Starts capturing right away. Must be called inside a Tokio runtime.
    pub fn submit_now(
        &self,
        spec: JobSpec,
        sink: Arc<dyn StatusSink>,
    ) -> Result<JobTicket, SubmitError> {
        self.submit(spec, sink, None)
    }

    /// Registers a job that starts capturing at `start_at` (now, if already past).
    pub fn submit_at(
        &self,
        spec: JobSpec,
        sink: Arc<dyn StatusSink>,
        start_at: DateTime<Local>,
    ) -> Result<JobTicket, SubmitError> {
        let start_at = start_at.max(Local::now());
        self.submit(spec, sink, Some(start_at))
    }

    fn submit(
        &self,
        spec: JobSpec,
        sink: Arc<dyn StatusSink>,
        start_at: Option<DateTime<Local>>,
    ) -> Result<JobTicket, SubmitError> {
        spec.validate().map_err(SubmitError::Invalid)?;

        let initial = if start_at.is_some() {
            JobPhase::Scheduled
        } else {
            JobPhase::Capturing
        };
        let id = spec.id.clone();
        let (phase_tx, phase_rx) = watch::channel(initial);
        let ticket_rx = phase_rx.clone();
        let status = Arc::new(StatusHandle::new(sink, spec.chat, spec.reply_to));
        let token = CancellationToken::new();
        let process = ProcessSlot::new();
        let submitted_at = Local::now();
        let inner = Arc::clone(&self.inner);
        let events = self.inner.events.clone();

        let registered = self.inner.registry.insert_with(&id, move |generation| {
            let _ = events.send(JobEvent::Phase {
                id: spec.id.clone(),
                phase: initial,
            });
            let run = JobRun {
                spec: spec.clone(),
                generation,
                start_at,
                status,
                token: token.clone(),
                process: process.clone(),
                phase: phase_tx,
            };
            let span = crate::logging::job_span(&run.spec.id);
            let task = tokio::spawn(run_job(inner, run).instrument(span));
            JobEntry {
                spec,
                phase: phase_rx,
                token,
                process,
                generation,
                submitted_at,
                starts_at: start_at.unwrap_or(submitted_at),
                task: Some(task),
            }
        });
        if registered.is_none() {
            tracing::warn!(job_id = %id, "duplicate submission rejected");
            return Err(SubmitError::Duplicate(id));
        }
        tracing::info!(job_id = %id, phase = initial.as_str(), start_at = ?start_at, "job submitted");
        Ok(JobTicket {
            id,
            phase: ticket_rx,
        })
    }

    /// Cancels a live job on behalf of `requester` (its owner or an admin).
    ///
    /// Returns `Ok(false)` if the id is unknown. Otherwise the job is removed
    /// from the registry, its capture process is sent SIGTERM, and the call
    /// waits (bounded) for the job's cleanup to finish.
    pub async fn cancel(&self, id: &JobId, requester: OwnerId) -> Result<bool, CancelError> {
        let Some(owner) = self.inner.registry.owner(id) else {
            return Ok(false);
        };
        if owner != requester && !self.inner.services.config.is_admin(requester) {
            tracing::warn!(job_id = %id, %requester, %owner, "cancel refused");
            return Err(CancelError::Unauthorized {
                job: id.clone(),
                requester,
            });
        }
        let Some(entry) = self.inner.registry.remove(id) else {
            return Ok(false);
        };
        tracing::info!(job_id = %id, %requester, "cancelling job");
        self.stop_entry(id, entry).await;
        Ok(true)
    }

    /// Cancels every live job; returns how many were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for id in self.inner.registry.ids() {
            if let Some(entry) = self.inner.registry.remove(&id) {
                self.stop_entry(&id, entry).await;
                cancelled += 1;
            }
        }
        cancelled
    }

    async fn stop_entry(&self, id: &JobId, mut entry: JobEntry) {
        entry.token.cancel();
        entry.process.terminate();
        let Some(task) = entry.task.take() else {
            return;
        };
        let grace = self.inner.services.config.capture.terminate_grace() + CANCEL_GRACE;
        match tokio::time::timeout(grace, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(job_id = %id, "job task ended abnormally: {}", e),
            Err(_) => tracing::warn!(job_id = %id, ?grace, "job cleanup still running after grace"),
        }
    }

    /// Snapshot of live jobs for status reporting.
    pub fn list_active(&self) -> Vec<JobSummary> {
        self.inner.registry.summaries()
    }
}
