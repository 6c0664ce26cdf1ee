//! Job registry: the single source of truth for which jobs are live.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::ProcessSlot;
use crate::job::{JobId, JobPhase, JobSpec, JobSummary, OwnerId};

/// Registry entry of one live job.
pub(crate) struct JobEntry {
    pub spec: JobSpec,
    pub phase: watch::Receiver<JobPhase>,
    pub token: CancellationToken,
    pub process: ProcessSlot,
    /// Distinguishes this registration from a later one with the same id.
    pub generation: u64,
    pub submitted_at: DateTime<Local>,
    pub starts_at: DateTime<Local>,
    pub task: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.spec.id.clone(),
            owner: self.spec.owner,
            title: self.spec.title.clone(),
            channel: self.spec.channel.clone(),
            phase: *self.phase.borrow(),
            duration_secs: self.spec.duration_secs,
            segment_secs: self.spec.segment_secs,
            submitted_at: self.submitted_at,
            starts_at: self.starts_at,
        }
    }
}

/// Live jobs keyed by id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    next_generation: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the entry built by `make` unless `id` is already live.
    /// `make` runs under the registry lock and receives the new generation,
    /// so the job task it spawns cannot retire before it is registered.
    pub(crate) fn insert_with<F>(&self, id: &JobId, make: F) -> Option<u64>
    where
        F: FnOnce(u64) -> JobEntry,
    {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(id) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        jobs.insert(id.clone(), make(generation));
        Some(generation)
    }

    /// Owner of a live job.
    pub fn owner(&self, id: &JobId) -> Option<OwnerId> {
        self.jobs.read().unwrap().get(id).map(|e| e.spec.owner)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self, id: &JobId) -> Option<JobPhase> {
        self.jobs.read().unwrap().get(id).map(|e| *e.phase.borrow())
    }

    /// Snapshot of every live job, oldest submission first.
    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut out: Vec<JobSummary> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .map(JobEntry::summary)
            .collect();
        out.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub(crate) fn remove(&self, id: &JobId) -> Option<JobEntry> {
        self.jobs.write().unwrap().remove(id)
    }

    pub(crate) fn ids(&self) -> Vec<JobId> {
        self.jobs.read().unwrap().keys().cloned().collect()
    }

    /// Removes `id` if it still belongs to `generation` (the job ended on its own).
    pub(crate) fn retire(&self, id: &JobId, generation: u64) -> bool {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get(id) {
            Some(e) if e.generation == generation => {
                jobs.remove(id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ChatId;

    fn entry(id: &str, generation: u64, phase: JobPhase) -> JobEntry {
        let (_tx, rx) = watch::channel(phase);
        let now = Local::now();
        JobEntry {
            spec: JobSpec {
                id: JobId::new(id),
                owner: OwnerId(9),
                chat: ChatId(9),
                stream_ref: "https://x/y.m3u8".into(),
                title: "T".into(),
                channel: "C".into(),
                duration_secs: 10,
                segment_secs: None,
                reply_to: None,
            },
            phase: rx,
            token: CancellationToken::new(),
            process: ProcessSlot::new(),
            generation,
            submitted_at: now,
            starts_at: now,
            task: None,
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let reg = JobRegistry::new();
        let id = JobId::new("1");
        assert!(reg
            .insert_with(&id, |g| entry("1", g, JobPhase::Capturing))
            .is_some());
        assert!(reg
            .insert_with(&id, |g| entry("1", g, JobPhase::Capturing))
            .is_none());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.owner(&id), Some(OwnerId(9)));
        assert_eq!(reg.phase(&id), Some(JobPhase::Capturing));
    }

    #[test]
    fn retire_checks_generation() {
        let reg = JobRegistry::new();
        let id = JobId::new("1");
        let first = reg
            .insert_with(&id, |g| entry("1", g, JobPhase::Scheduled))
            .unwrap();
        assert!(reg.remove(&id).is_some());
        let second = reg
            .insert_with(&id, |g| entry("1", g, JobPhase::Scheduled))
            .unwrap();
        assert_ne!(first, second);
        assert!(!reg.retire(&id, first));
        assert!(reg.contains(&id));
        assert!(reg.retire(&id, second));
        assert!(reg.is_empty());
    }

    #[test]
    fn summaries_reflect_phase() {
        let reg = JobRegistry::new();
        reg.insert_with(&JobId::new("b"), |g| entry("b", g, JobPhase::Delivering));
        let list = reg.summaries();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].phase, JobPhase::Delivering);
        assert_eq!(list[0].title, "T");
    }
}
