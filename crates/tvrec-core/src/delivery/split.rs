//! Planning of time-bounded parts for artifacts above the transfer limit.

use std::path::{Path, PathBuf};

use crate::media::SEQUENCE_PLACEHOLDER;

/// How an oversized artifact is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    pub parts: u64,
    pub segment_secs: u64,
}

impl SplitPlan {
    /// Part count from the byte limit, segment length from the known duration
    /// and that count. None when the artifact fits or its duration is unknown.
    pub fn new(size: u64, duration_secs: f64, part_limit: u64) -> Option<Self> {
        let part_limit = part_limit.max(1);
        if size <= part_limit || !duration_secs.is_finite() || duration_secs <= 0.0 {
            return None;
        }
        let parts = size.div_ceil(part_limit).max(2);
        let segment_secs = (duration_secs / parts as f64).ceil().max(1.0) as u64;
        Some(Self {
            parts,
            segment_secs,
        })
    }
}

/// `<dir>/<stem>.part%03d.<ext>` next to the source file.
pub fn part_pattern(src: &Path) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let name = match src.extension() {
        Some(ext) => format!("{}.part{}.{}", stem, SEQUENCE_PLACEHOLDER, ext.to_string_lossy()),
        None => format!("{}.part{}", stem, SEQUENCE_PLACEHOLDER),
    };
    src.with_file_name(name)
}
