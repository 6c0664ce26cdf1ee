//! Job identity, submission spec and the phase state machine.

mod parse;
mod phase;

pub use parse::{parse_duration, parse_start_time, ParseError};
pub use phase::JobPhase;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied job identifier (typically the id of the request message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// User who submitted a job (or asks to cancel one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat / channel identity on the messaging side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identity within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_channel() -> String {
    "Direct Stream".to_string()
}

/// Longest capture or segment accepted (30 days).
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 3600;

/// Everything the command layer hands over when submitting a capture job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub owner: OwnerId,
    /// Chat that asked for the capture; delivered artifacts end up here.
    pub chat: ChatId,
    pub stream_ref: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Requested capture length in seconds; 0 means unbounded.
    #[serde(default)]
    pub duration_secs: u64,
    /// Roll over to a new output file every this many seconds.
    #[serde(default)]
    pub segment_secs: Option<u64>,
    /// Request message the job narration replies to.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

impl JobSpec {
    pub fn is_unbounded(&self) -> bool {
        self.duration_secs == 0
    }

    /// Input checks done before a job is registered; a failing spec never starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("job id is empty".to_string());
        }
        if self.stream_ref.trim().is_empty() {
            return Err("missing stream reference".to_string());
        }
        if self.segment_secs == Some(0) {
            return Err("segment duration must be greater than zero".to_string());
        }
        if self.duration_secs > MAX_DURATION_SECS {
            return Err(format!(
                "duration of {}s exceeds the {}s limit",
                self.duration_secs, MAX_DURATION_SECS
            ));
        }
        if self.segment_secs.is_some_and(|s| s > MAX_DURATION_SECS) {
            return Err(format!("segment duration exceeds the {}s limit", MAX_DURATION_SECS));
        }
        Ok(())
    }
}

/// Read-only view of a registered job, used by status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub owner: OwnerId,
    pub title: String,
    pub channel: String,
    pub phase: JobPhase,
    pub duration_secs: u64,
    pub segment_secs: Option<u64>,
    pub submitted_at: DateTime<Local>,
    pub starts_at: DateTime<Local>,
}
