//! Low-cadence progress renders for one transfer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::sampler::TransferSnapshot;
use crate::status::{captions, StatusHandle};

/// Drains snapshots and renders the newest one at most once per `interval`.
/// Returns when the transfer is done or every sender is gone; the return value
/// is the number of renders pushed.
pub async fn run_notifier(
    mut rx: mpsc::Receiver<TransferSnapshot>,
    status: Arc<StatusHandle>,
    file_name: String,
    interval: Duration,
) -> usize {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut latest: Option<TransferSnapshot> = None;
    let mut rendered = 0;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(snapshot) if snapshot.is_done() => break,
                Some(snapshot) => latest = Some(snapshot),
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(s) = latest.take() {
                    let text = captions::uploading(
                        &file_name,
                        s.transferred,
                        s.total,
                        s.speed_bps,
                        s.eta(),
                    );
                    if status.push(&text, &[]).await {
                        rendered += 1;
                    }
                }
            }
        }
    }
    rendered
}
