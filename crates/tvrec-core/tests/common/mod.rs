#![allow(dead_code)]

pub mod fakes;

use std::path::Path;
use std::sync::Arc;

use tvrec_core::config::TvrecConfig;
use tvrec_core::job::{ChatId, JobId, JobSpec, OwnerId};
use tvrec_core::scheduler::{Scheduler, Services};

/// Config with short cadences, recording into `dir`.
pub fn test_config(dir: &Path) -> TvrecConfig {
    let mut cfg = TvrecConfig::default();
    cfg.recordings_dir = dir.to_path_buf();
    cfg.admins = vec![OwnerId(1000)];
    cfg.capture.progress_interval_secs = 0.2;
    cfg.capture.stop_grace_secs = 5;
    cfg.capture.terminate_grace_secs = 1;
    cfg.delivery.notify_interval_secs = 0.1;
    cfg.delivery.speed_sample_ms = 10;
    cfg.delivery.log_interval_ms = 50;
    cfg.delivery.safety_margin_bytes = 0;
    cfg.delivery.transfer_timeout_secs = 30;
    cfg.retry = Some(tvrec_core::config::RetryConfig {
        max_attempts: 3,
        base_delay_secs: 0.01,
        max_delay_secs: 1,
    });
    cfg
}

pub fn spec(id: &str, duration_secs: u64, segment_secs: Option<u64>) -> JobSpec {
    JobSpec {
        id: JobId::new(id),
        owner: OwnerId(7),
        chat: ChatId(7),
        stream_ref: "https://streams.example/live/index.m3u8".to_string(),
        title: "Evening News".to_string(),
        channel: "Channel 1".to_string(),
        duration_secs,
        segment_secs,
        reply_to: None,
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub media: Arc<fakes::FakeMedia>,
    pub store: Arc<fakes::FakeStore>,
    pub sink: Arc<fakes::RecordingSink>,
}

pub fn harness(cfg: TvrecConfig, media: fakes::FakeMedia, store: fakes::FakeStore) -> Harness {
    let media = Arc::new(media);
    let store = Arc::new(store);
    let services = Services::new(
        cfg,
        media.clone(),
        Arc::new(fakes::PassThrough),
        store.clone(),
    );
    Harness {
        scheduler: Scheduler::new(services),
        media,
        store,
        sink: Arc::new(fakes::RecordingSink::default()),
    }
}

/// Names of the files left in `dir`.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
