//! Capture Supervisor: drives one external capture process per job from
//! start to natural or forced end, narrates progress, and turns the output
//! into named artifacts.

mod finalize;
mod plan;
mod process;
mod supervisor;
mod temp;

pub use plan::{CapturePlan, LABEL_TIME_FORMAT};
pub use process::ProcessSlot;
pub use supervisor::{CaptureSupervisor, RecordedCapture};
pub use temp::{RemoveOnDrop, TempFiles};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::media::Quality;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid stream reference: {0}")]
    InvalidReference(String),
    #[error("failed to start capture process: {0}")]
    Launch(#[source] std::io::Error),
    #[error("capture process {0}")]
    AbnormalExit(String),
    #[error("stream ended before the capture was stopped")]
    StreamEnded,
    #[error("capture produced no output")]
    NoOutput,
    #[error("capture io: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture cancelled")]
    Cancelled,
}

/// One finished capture output, ready for delivery.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
    /// Measured duration in seconds (requested duration when probing failed).
    pub duration_secs: f64,
    pub thumbnail: Option<PathBuf>,
    /// 0-based position in the capture sequence.
    pub index: usize,
    pub quality: Quality,
}

impl Artifact {
    /// Artifact for an existing file with nothing measured yet.
    pub fn from_path(path: impl Into<PathBuf>, size: u64, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            size,
            duration_secs,
            thumbnail: None,
            index: 0,
            quality: Quality::Unknown,
        }
    }

    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }

    /// Local files owned by this artifact (the media file and its thumbnail).
    pub fn local_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        files.extend(self.thumbnail.clone());
        files
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
