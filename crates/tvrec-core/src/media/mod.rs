//! External media tooling: capture command construction, thumbnails,
//! probing and stream-copy splitting.
//!
//! Everything out-of-process goes through `MediaTools` so the supervisor and
//! the delivery pipeline can be driven by fake tools in tests.

mod ffmpeg;
mod quality;

pub use ffmpeg::Ffmpeg;
pub use quality::Quality;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Placeholder the segment muxer replaces with the sequence number.
pub const SEQUENCE_PLACEHOLDER: &str = "%03d";

/// Where a capture writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutput {
    /// One file for the whole capture.
    Single(PathBuf),
    /// A numbered sequence of files, one every `segment_secs`.
    Segmented { pattern: PathBuf, segment_secs: u64 },
}

/// Arguments of one capture process.
#[derive(Debug, Clone)]
pub struct CaptureArgs {
    /// Resolved stream URL.
    pub input: String,
    /// Stop after this many seconds; None captures until stopped.
    pub duration_secs: Option<u64>,
    pub output: CaptureOutput,
}

#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Command that captures `args.input` in stream-copy mode. The caller spawns it.
    fn capture_command(&self, args: &CaptureArgs) -> tokio::process::Command;

    /// Writes a single-frame thumbnail of `src` to `dst`.
    async fn extract_thumbnail(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Media duration in seconds.
    async fn media_duration(&self, path: &Path) -> Result<f64>;

    async fn media_quality(&self, path: &Path) -> Result<Quality>;

    /// Stream-copies `src` into `segment_secs` long parts named after `pattern`
    /// and returns them in sequence order.
    async fn split(&self, src: &Path, segment_secs: u64, pattern: &Path) -> Result<Vec<PathBuf>>;
}

/// Files produced for a `%03d` pattern, in sequence order.
pub fn list_sequence(pattern: &Path) -> std::io::Result<Vec<PathBuf>> {
    let dir = match pattern.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = pattern
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (prefix, suffix) = match name.split_once(SEQUENCE_PLACEHOLDER) {
        Some(parts) => parts,
        None => return Ok(Vec::new()),
    };

    let mut found: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let seq = file_name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(seq) = seq {
            found.push((seq, entry.path()));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, p)| p).collect())
}
