use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse resolution bucket used in artifact names and captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    Fhd,
    Hd,
    Sd,
    /// Some other valid resolution.
    Hq,
    #[default]
    Unknown,
}

impl Quality {
    /// Classifies ffprobe `WIDTHxHEIGHT` output.
    pub fn from_resolution(s: &str) -> Self {
        let s = s.lines().next().unwrap_or("").trim();
        let Some((w, h)) = s.split_once('x') else {
            return Quality::Unknown;
        };
        let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>()) else {
            return Quality::Unknown;
        };
        match (w, h) {
            (1920, _) => Quality::Fhd,
            (1280, _) => Quality::Hd,
            (854, 480) | (720, 480) => Quality::Sd,
            _ => Quality::Hq,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Fhd => "FHD",
            Quality::Hd => "HD",
            Quality::Sd => "SD",
            Quality::Hq => "HQ",
            Quality::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
