use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::path::{Path, PathBuf};

use super::TempFiles;
use crate::job::{JobId, JobSpec};
use crate::media::{CaptureArgs, CaptureOutput, SEQUENCE_PLACEHOLDER};
use crate::naming;
use crate::status::captions::CaptureLabel;

/// Timestamp layout shown in captions.
pub const LABEL_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Everything the supervisor needs to run one capture.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub job: JobId,
    pub stream_ref: String,
    pub title: String,
    pub channel: String,
    /// 0 = unbounded.
    pub duration_secs: u64,
    pub segment_secs: Option<u64>,
    pub dir: PathBuf,
    /// Prefix of every temp file this capture writes.
    pub prefix: String,
    pub ext: String,
    pub started_at: DateTime<Local>,
    started_label: String,
}

impl CapturePlan {
    pub fn new(spec: &JobSpec, dir: &Path, ext: &str, started_at: DateTime<Local>) -> Self {
        Self {
            job: spec.id.clone(),
            stream_ref: spec.stream_ref.clone(),
            title: spec.title.clone(),
            channel: spec.channel.clone(),
            duration_secs: spec.duration_secs,
            segment_secs: spec.segment_secs,
            dir: dir.to_path_buf(),
            prefix: naming::temp_prefix(spec.id.as_str(), started_at),
            ext: ext.trim_start_matches('.').to_string(),
            started_at,
            started_label: started_at.format(LABEL_TIME_FORMAT).to_string(),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.duration_secs == 0
    }

    /// Planned end of a bounded capture.
    pub fn planned_end(&self) -> Option<DateTime<Local>> {
        (!self.is_unbounded())
            .then(|| self.started_at + ChronoDuration::seconds(self.duration_secs as i64))
    }

    pub fn output(&self) -> CaptureOutput {
        match self.segment_secs {
            Some(segment_secs) => CaptureOutput::Segmented {
                pattern: self.dir.join(format!(
                    "{}_{}.{}",
                    self.prefix, SEQUENCE_PLACEHOLDER, self.ext
                )),
                segment_secs,
            },
            None => CaptureOutput::Single(self.dir.join(format!("{}.{}", self.prefix, self.ext))),
        }
    }

    pub fn capture_args(&self, input: String) -> CaptureArgs {
        CaptureArgs {
            input,
            duration_secs: (!self.is_unbounded()).then_some(self.duration_secs),
            output: self.output(),
        }
    }

    pub fn temp_files(&self) -> TempFiles {
        TempFiles::new(&self.dir, &self.prefix)
    }

    pub fn label(&self) -> CaptureLabel<'_> {
        CaptureLabel {
            title: &self.title,
            channel: &self.channel,
            total_secs: self.duration_secs,
            started_at: &self.started_label,
        }
    }
}
