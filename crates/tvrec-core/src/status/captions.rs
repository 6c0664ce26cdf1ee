//! Text renderers for every narration the engine produces.

use std::time::Duration;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━";

/// `HH:MM:SS`, rounding to the nearest second.
pub fn seconds_to_hms(secs: f64) -> String {
    let s = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

/// Short human duration: `45s`, `2m 5s`, `3m`, `1h 30m`, `2h`.
pub fn smart_duration(secs: f64) -> String {
    let s = secs.max(0.0).round() as u64;
    if s < 60 {
        format!("{}s", s)
    } else if s < 3600 {
        let (m, r) = (s / 60, s % 60);
        if r == 0 {
            format!("{}m", m)
        } else {
            format!("{}m {}s", m, r)
        }
    } else {
        let (h, m) = (s / 3600, (s % 3600) / 60);
        if m == 0 {
            format!("{}h", h)
        } else {
            format!("{}h {}m", h, m)
        }
    }
}

/// Fixed-width bar for a fraction in [0, 1].
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * width as f64) as usize;
    let mut bar = String::with_capacity(width * 3);
    for i in 0..width {
        bar.push(if i < filled { '▰' } else { '▱' });
    }
    bar
}

/// Binary-prefixed size, e.g. `1.50 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn duration_label(total_secs: u64) -> String {
    if total_secs == 0 {
        "∞ Unlimited".to_string()
    } else {
        seconds_to_hms(total_secs as f64)
    }
}

/// Identity of a capture shown in every recording caption.
#[derive(Debug, Clone)]
pub struct CaptureLabel<'a> {
    pub title: &'a str,
    pub channel: &'a str,
    pub total_secs: u64,
    pub started_at: &'a str,
}

impl CaptureLabel<'_> {
    fn block(&self) -> String {
        format!(
            "📌 `{}`\n📡 `{}`\n⏱ `{}`\n🕐 `{}`",
            self.title,
            self.channel,
            duration_label(self.total_secs),
            self.started_at
        )
    }
}

pub fn recording_started(label: &CaptureLabel<'_>) -> String {
    format!(
        "🔴 **RECORDING**\n{}\n\n{}\n\n⏳ Initializing stream...",
        RULE,
        label.block()
    )
}

/// Progress snapshot. Unbounded captures render elapsed time only; bounded
/// captures render percentage, elapsed and remaining.
pub fn recording_progress(label: &CaptureLabel<'_>, elapsed: Duration, error: Option<&str>) -> String {
    let elapsed_secs = elapsed.as_secs_f64();
    let status = match error {
        Some(e) => format!("❌ {}", e),
        None => "🟢 Recording...".to_string(),
    };
    if label.total_secs == 0 {
        return format!(
            "🔴 **RECORDING** • `{}`\n{}\n\n{}\n\n▶️ Elapsed: **{}**\n\n{}",
            seconds_to_hms(elapsed_secs),
            RULE,
            label.block(),
            smart_duration(elapsed_secs),
            status
        );
    }
    let total = label.total_secs as f64;
    let fraction = (elapsed_secs / total).min(1.0);
    let pct = (fraction * 100.0) as u64;
    let remaining = (total - elapsed_secs).max(0.0);
    format!(
        "🔴 **RECORDING** • `{}%`\n{}\n\n{}\n\n{} **{}%**\n▶️ `{}` │ ⏳ `{}` left\n\n{}",
        pct,
        RULE,
        label.block(),
        progress_bar(fraction, 15),
        pct,
        seconds_to_hms(elapsed_secs),
        seconds_to_hms(remaining),
        status
    )
}

pub fn recording_completed(label: &CaptureLabel<'_>, ended_at: &str) -> String {
    format!(
        "✅ **RECORDING DONE**\n{}\n\n{}\n🏁 `{}`\n\n📤 Preparing upload...",
        RULE,
        label.block(),
        ended_at
    )
}

pub fn recording_cancelled(label: &CaptureLabel<'_>) -> String {
    format!(
        "⏹ **CANCELLED**\n{}\n\n{}\n\n🚫 Recording stopped by user",
        RULE,
        label.block()
    )
}

pub fn recording_failed(label: &CaptureLabel<'_>, reason: &str) -> String {
    format!(
        "❌ **RECORDING FAILED**\n{}\n\n{}\n\n⚠️ {}",
        RULE,
        label.block(),
        reason
    )
}

pub fn scheduled(label: &CaptureLabel<'_>, starts_at: &str) -> String {
    format!(
        "🗓 **SCHEDULED**\n{}\n\n{}\n\n⏰ Starts at `{}`",
        RULE,
        label.block(),
        starts_at
    )
}

pub fn upload_waiting(file_name: &str) -> String {
    format!("📤 **UPLOAD QUEUED**\n{}\n\n📂 `{}`\n⏳ Waiting for a transfer slot...", RULE, file_name)
}

/// Upload progress render: percentage, transferred/total, speed and ETA.
pub fn uploading(
    file_name: &str,
    transferred: u64,
    total: u64,
    speed_bps: f64,
    eta: Option<Duration>,
) -> String {
    let fraction = if total == 0 {
        1.0
    } else {
        (transferred as f64 / total as f64).min(1.0)
    };
    let pct = fraction * 100.0;
    let eta = eta
        .map(|d| seconds_to_hms(d.as_secs_f64()))
        .unwrap_or_else(|| "--:--:--".to_string());
    format!(
        "📤 **UPLOADING** • `{:.1}%`\n{}\n\n📂 `{}`\n\n{} **{:.1}%**\n💾 `{}` / `{}`\n🚀 `{}/s` │ ⏳ `{}`",
        pct,
        RULE,
        file_name,
        progress_bar(fraction, 15),
        pct,
        format_bytes(transferred),
        format_bytes(total),
        format_bytes(speed_bps.max(0.0) as u64),
        eta
    )
}

pub fn upload_succeeded(file_name: &str) -> String {
    format!("📂 **File:** `{}`\n✅ **Uploaded Successfully!**", file_name)
}

pub fn upload_failed(file_name: &str, reason: &str) -> String {
    format!(
        "📂 **File:** `{}`\n❌ **Upload Failed!**\n⚠️ **Reason:** {}",
        file_name, reason
    )
}

/// Caption stored with an uploaded artifact.
pub fn artifact_caption(file_name: &str, duration_secs: f64, size: u64, quality: &str) -> String {
    format!(
        "📦 `{}`\n🎞 `{}`\n⏱ `{}`\n💾 `{}`",
        file_name,
        quality,
        seconds_to_hms(duration_secs),
        format_bytes(size)
    )
}

/// Caption of one part of a split artifact.
pub fn part_caption(caption: &str, index: usize, count: usize) -> String {
    format!("{} (Part {}/{})", caption, index, count)
}

pub fn job_completed(label: &CaptureLabel<'_>, delivered: usize) -> String {
    format!(
        "✅ **DONE**\n{}\n\n{}\n\n📦 {} file(s) delivered",
        RULE,
        label.block(),
        delivered
    )
}

pub fn job_failed(label: &CaptureLabel<'_>, reason: &str) -> String {
    format!("❌ **FAILED**\n{}\n\n{}\n\n⚠️ {}", RULE, label.block(), reason)
}
