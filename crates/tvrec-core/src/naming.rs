//! Filename sanitization, temp prefixes and final artifact names.

use chrono::{DateTime, Local};

/// Prefix shared by every temp file of one capture.
pub const TEMP_PREFIX: &str = "tvrec_";

/// Sanitizes a candidate filename component for Linux and common remote stores.
///
/// - Replaces NUL, `/`, `\`, `<>:"|?*`, whitespace and control characters with `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores
/// - Limits length to `max_bytes` on a char boundary
pub fn sanitize_component(name: &str, max_bytes: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let bad = c.is_control()
            || c.is_whitespace()
            || matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*');
        if bad || c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.len() > max_bytes {
        let mut take = max_bytes;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Prefix of every temp file a capture writes: `tvrec_<job>_<unix millis>`.
pub fn temp_prefix(job_id: &str, started_at: DateTime<Local>) -> String {
    let job = sanitize_component(job_id, 64);
    let job = if job.is_empty() { "job".to_string() } else { job };
    format!("{}{}_{}", TEMP_PREFIX, job, started_at.timestamp_millis())
}

/// Inputs for a final artifact name.
#[derive(Debug, Clone)]
pub struct ArtifactName<'a> {
    pub title: &'a str,
    pub channel: &'a str,
    pub started_at: DateTime<Local>,
    /// None for unbounded captures.
    pub ended_at: Option<DateTime<Local>>,
    /// 1-based part number when the capture produced several segments.
    pub part: Option<usize>,
    pub quality: &'a str,
    pub ext: &'a str,
}

impl ArtifactName<'_> {
    /// `Title[_part_N].Channel.HH-MM-SS-HH-MM-SS.DD-MM-YYYY.<unix>.<token>.<quality>.<ext>`
    ///
    /// The random token keeps names unique across captures of the same show.
    pub fn render(&self) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.render_with_token(&token[..8])
    }

    pub fn render_with_token(&self, token: &str) -> String {
        let title = non_empty(sanitize_component(self.title, 80), "Untitled");
        let channel = non_empty(sanitize_component(self.channel, 40), "Stream");
        let part = self
            .part
            .map(|n| format!("_part_{}", n))
            .unwrap_or_default();
        let start = self.started_at.format("%H-%M-%S");
        let end = self
            .ended_at
            .map(|e| e.format("%H-%M-%S").to_string())
            .unwrap_or_else(|| "UNLIMITED".to_string());
        let quality = non_empty(sanitize_component(self.quality, 16), "Unknown");
        format!(
            "{}{}.{}.{}-{}.{}.{}.{}.{}.{}",
            title,
            part,
            channel,
            start,
            end,
            self.started_at.format("%d-%m-%Y"),
            self.started_at.timestamp(),
            token,
            quality,
            self.ext
        )
    }
}

fn non_empty(s: String, fallback: &str) -> String {
    if s.is_empty() {
        fallback.to_string()
    } else {
        s
    }
}
