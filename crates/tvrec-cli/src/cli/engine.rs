//! Wiring of the core services from config.

use anyhow::Result;
use std::sync::Arc;
use tvrec_core::config::{StoreKind, TvrecConfig};
use tvrec_core::delivery::{open_store, StoreStatusSink};
use tvrec_core::media::Ffmpeg;
use tvrec_core::resolver::CurlResolver;
use tvrec_core::scheduler::{Scheduler, Services};
use tvrec_core::status::StatusSink;

use super::console_sink::ConsoleStatusSink;

/// Builds the scheduler and the status sink jobs narrate to. Stores that
/// carry messages get the narration; otherwise it goes to stdout.
pub fn build(cfg: TvrecConfig) -> Result<(Scheduler, Arc<dyn StatusSink>)> {
    let store = open_store(&cfg.store)?;
    let sink: Arc<dyn StatusSink> = match cfg.store.kind {
        StoreKind::Http => Arc::new(StoreStatusSink::new(Arc::clone(&store))),
        StoreKind::Dir => Arc::new(ConsoleStatusSink::new()),
    };
    let media = Arc::new(Ffmpeg::new(&cfg.capture));
    let resolver = Arc::new(CurlResolver::new(cfg.capture.request_headers()));
    let services = Services::new(cfg, media, resolver, store);
    Ok((Scheduler::new(services), sink))
}
