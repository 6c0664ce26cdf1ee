//! Parsing of user-supplied durations and start times.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use thiserror::Error;

/// Start time format accepted by the schedule command.
pub const START_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid duration {0:?}: use seconds, MM:SS or HH:MM:SS")]
    Duration(String),
    #[error("invalid start time {0:?}: use DD-MM-YYYY HH:MM:SS")]
    StartTime(String),
    #[error("start time {0:?} does not exist in the local time zone")]
    NonexistentLocalTime(String),
}

/// Parses `SS`, `MM:SS` or `HH:MM:SS` into seconds.
pub fn parse_duration(s: &str) -> Result<u64, ParseError> {
    let err = || ParseError::Duration(s.to_string());
    let s = s.trim();
    if s.is_empty() {
        return Err(err());
    }
    let parts: Vec<u64> = s
        .split(':')
        .map(|p| p.parse::<u64>().map_err(|_| err()))
        .collect::<Result<_, _>>()?;
    let total = match parts.as_slice() {
        [secs] => Some(*secs),
        [m, s] if *s < 60 => m.checked_mul(60).and_then(|t| t.checked_add(*s)),
        [h, m, s] if *m < 60 && *s < 60 => h
            .checked_mul(3600)
            .and_then(|t| t.checked_add(m * 60 + s)),
        _ => None,
    };
    total.ok_or_else(err)
}

/// Parses `DD-MM-YYYY HH:MM:SS` as a local wall-clock time.
pub fn parse_start_time(s: &str) -> Result<DateTime<Local>, ParseError> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), START_TIME_FORMAT)
        .map_err(|_| ParseError::StartTime(s.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ParseError::NonexistentLocalTime(s.to_string()))
}
