//! `tvrec inspect <file>` – print duration and quality bucket.

use anyhow::{Context, Result};
use std::path::Path;
use tvrec_core::config::TvrecConfig;
use tvrec_core::media::{Ffmpeg, MediaTools};
use tvrec_core::status::captions::{format_bytes, seconds_to_hms};

pub async fn run_inspect(cfg: &TvrecConfig, path: &Path) -> Result<()> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("read {}", path.display()))?
        .len();
    let media = Ffmpeg::new(&cfg.capture);
    let duration = media.media_duration(path).await?;
    let quality = media.media_quality(path).await.unwrap_or_default();
    println!("File:     {}", path.display());
    println!("Size:     {}", format_bytes(size));
    println!("Duration: {} ({:.3}s)", seconds_to_hms(duration), duration);
    println!("Quality:  {}", quality);
    Ok(())
}
