//! Synchronous transfer sampler on the hot path.
//!
//! Called once per chunk. It only does arithmetic, an occasional debug log
//! line and a non-blocking `try_send`; it never touches the network.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Weight of the newest instantaneous sample in the speed estimate.
const SPEED_SMOOTHING: f64 = 0.5;

/// Live state of one artifact transfer.
#[derive(Debug, Clone)]
pub struct TransferState {
    pub transferred: u64,
    pub total: u64,
    /// Smoothed bytes per second.
    pub speed_bps: f64,
    pub started: Instant,
    last_sample: Instant,
    last_sample_bytes: u64,
    last_log: Option<Instant>,
}

impl TransferState {
    pub fn new(total: u64, now: Instant) -> Self {
        Self {
            transferred: 0,
            total,
            speed_bps: 0.0,
            started: now,
            last_sample: now,
            last_sample_bytes: 0,
            last_log: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.total > 0 && self.transferred >= self.total
    }
}

/// Point-in-time copy of a `TransferState` handed to the notifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSnapshot {
    pub transferred: u64,
    pub total: u64,
    pub speed_bps: f64,
    pub elapsed: Duration,
}

impl TransferSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.transferred as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// `elapsed * (100 / percent - 1)`; None until something was transferred.
    pub fn eta(&self) -> Option<Duration> {
        let pct = self.percent();
        if pct <= 0.0 {
            return None;
        }
        Some(self.elapsed.mul_f64((100.0 / pct - 1.0).max(0.0)))
    }

    pub fn is_done(&self) -> bool {
        self.total > 0 && self.transferred >= self.total
    }
}

pub struct TransferSampler {
    file_name: String,
    state: TransferState,
    tx: mpsc::Sender<TransferSnapshot>,
    sample_every: Duration,
    log_every: Duration,
}

impl TransferSampler {
    pub fn new(
        file_name: String,
        total: u64,
        tx: mpsc::Sender<TransferSnapshot>,
        sample_every: Duration,
        log_every: Duration,
    ) -> Self {
        Self {
            file_name,
            state: TransferState::new(total, Instant::now()),
            tx,
            sample_every,
            log_every,
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn on_progress(&mut self, transferred: u64, total: u64) {
        self.on_progress_at(Instant::now(), transferred, total);
    }

    /// Updates the state for a chunk reported at `now`. A snapshot is queued
    /// on every speed sample and once the transfer is complete.
    pub fn on_progress_at(&mut self, now: Instant, transferred: u64, total: u64) {
        let s = &mut self.state;
        if total > 0 {
            s.total = total;
        }
        s.transferred = transferred;

        let since_sample = now.saturating_duration_since(s.last_sample);
        let sampled = since_sample >= self.sample_every || s.is_done();
        if sampled && !since_sample.is_zero() {
            let delta = transferred.saturating_sub(s.last_sample_bytes) as f64;
            let instant = delta / since_sample.as_secs_f64();
            s.speed_bps = if s.speed_bps == 0.0 {
                instant
            } else {
                SPEED_SMOOTHING * instant + (1.0 - SPEED_SMOOTHING) * s.speed_bps
            };
            s.last_sample = now;
            s.last_sample_bytes = transferred;
        }

        let log_due = s
            .last_log
            .map_or(true, |t| now.saturating_duration_since(t) >= self.log_every);
        if log_due {
            s.last_log = Some(now);
            tracing::debug!(
                file = %self.file_name,
                transferred,
                total = s.total,
                speed_bps = s.speed_bps as u64,
                "transfer progress"
            );
        }

        if sampled {
            let snapshot = TransferSnapshot {
                transferred,
                total: s.total,
                speed_bps: s.speed_bps,
                elapsed: now.saturating_duration_since(s.started),
            };
            // A full queue only means the notifier has not caught up; drop the sample.
            let _ = self.tx.try_send(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(cap: usize) -> (TransferSampler, mpsc::Receiver<TransferSnapshot>) {
        let (tx, rx) = mpsc::channel(cap);
        let s = TransferSampler::new(
            "a.mkv".into(),
            1000,
            tx,
            Duration::from_millis(500),
            Duration::from_secs(1),
        );
        (s, rx)
    }

    #[test]
    fn samples_speed_at_fixed_cadence() {
        let (mut s, mut rx) = sampler(16);
        let t0 = s.state().started;
        s.on_progress_at(t0 + Duration::from_millis(100), 100, 1000);
        assert!(rx.try_recv().is_err());
        s.on_progress_at(t0 + Duration::from_millis(500), 200, 1000);
        let snap = rx.try_recv().unwrap();
        assert_eq!(snap.transferred, 200);
        assert!((snap.speed_bps - 400.0).abs() < 1e-6);
        s.on_progress_at(t0 + Duration::from_millis(1000), 400, 1000);
        let snap = rx.try_recv().unwrap();
        // 0.5 * 400 + 0.5 * 400
        assert!((snap.speed_bps - 400.0).abs() < 1e-6);
        assert_eq!(s.state().transferred, 400);
    }

    #[test]
    fn completion_always_queues_a_snapshot() {
        let (mut s, mut rx) = sampler(16);
        let t0 = s.state().started;
        s.on_progress_at(t0 + Duration::from_millis(10), 1000, 1000);
        let snap = rx.try_recv().unwrap();
        assert!(snap.is_done());
        assert!(s.state().is_done());
    }

    #[test]
    fn full_queue_does_not_block() {
        let (mut s, _rx) = sampler(1);
        let t0 = s.state().started;
        for i in 1..=10u64 {
            s.on_progress_at(t0 + Duration::from_secs(i), i * 100, 1000);
        }
        assert_eq!(s.state().transferred, 1000);
    }

    #[test]
    fn eta_from_elapsed_and_percent() {
        let snap = TransferSnapshot {
            transferred: 250,
            total: 1000,
            speed_bps: 0.0,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(snap.eta(), Some(Duration::from_secs(30)));
        let none = TransferSnapshot {
            transferred: 0,
            ..snap
        };
        assert_eq!(none.eta(), None);
    }
}
