use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::job::OwnerId;

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// External capture tooling and narration cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Headers passed to the capture process and the stream resolver.
    pub user_agent: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Seconds between two progress snapshots while capturing.
    pub progress_interval_secs: f64,
    /// How long a bounded capture may overrun its duration before it is asked to stop.
    pub stop_grace_secs: u64,
    /// How long a terminated capture process gets before it is killed.
    pub terminate_grace_secs: u64,
    /// Container extension used for capture output (stream copy).
    pub container_ext: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            referer: None,
            origin: None,
            progress_interval_secs: 10.0,
            stop_grace_secs: 30,
            terminate_grace_secs: 5,
            container_ext: "mkv".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs_f64(self.progress_interval_secs.max(0.01))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    /// Per-request headers sent to the stream origin (`Name`, `value`).
    pub fn request_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("User-Agent", self.user_agent.clone())];
        if let Some(r) = &self.referer {
            headers.push(("Referer", r.clone()));
        }
        if let Some(o) = &self.origin {
            headers.push(("Origin", o.clone()));
        }
        headers
    }
}

/// Delivery pipeline limits and cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Largest artifact the remote store accepts in one transfer.
    pub max_unit_bytes: u64,
    /// Head-room subtracted from `max_unit_bytes` when planning split parts.
    pub safety_margin_bytes: u64,
    /// Size of each chunk handed to the store.
    pub chunk_bytes: usize,
    /// Minimum spacing of local transfer log lines (milliseconds).
    pub log_interval_ms: u64,
    /// Minimum spacing of speed samples (milliseconds).
    pub speed_sample_ms: u64,
    /// Seconds between two progress renders pushed to the status sink.
    pub notify_interval_secs: f64,
    /// Upper bound for a single transfer before it is treated as failed.
    pub transfer_timeout_secs: u64,
    /// Chat that receives uploads; deliveries for other chats are forwarded by reference.
    pub store_chat: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_unit_bytes: 2 * GIB,
            safety_margin_bytes: 50 * MIB,
            chunk_bytes: 512 * 1024,
            log_interval_ms: 1000,
            speed_sample_ms: 500,
            notify_interval_secs: 4.0,
            transfer_timeout_secs: 3600,
            store_chat: 0,
        }
    }
}

impl DeliveryConfig {
    /// Largest part planned when splitting an oversized artifact.
    pub fn part_limit_bytes(&self) -> u64 {
        self.max_unit_bytes
            .saturating_sub(self.safety_margin_bytes)
            .max(1)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    pub fn speed_sample(&self) -> Duration {
        Duration::from_millis(self.speed_sample_ms)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs_f64(self.notify_interval_secs.max(0.01))
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Retry policy parameters for store transfers (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per artifact (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5.0,
            max_delay_secs: 60,
        }
    }
}

/// Remote store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Dir,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Base URL of the HTTP store API (kind = "http").
    pub base_url: Option<String>,
    /// Bearer token for the HTTP store API.
    pub token: Option<String>,
    /// Archive directory (kind = "dir").
    pub dir: Option<PathBuf>,
}

/// Global configuration loaded from `~/.config/tvrec/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvrecConfig {
    /// Where capture output and temp files live.
    pub recordings_dir: PathBuf,
    /// Owners allowed to cancel any job.
    #[serde(default)]
    pub admins: Vec<OwnerId>,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for TvrecConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            admins: Vec::new(),
            capture: CaptureConfig::default(),
            delivery: DeliveryConfig::default(),
            retry: None,
            store: StoreConfig::default(),
        }
    }
}

impl TvrecConfig {
    pub fn is_admin(&self, owner: OwnerId) -> bool {
        self.admins.contains(&owner)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tvrec")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TvrecConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TvrecConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TvrecConfig = toml::from_str(&data)?;
    Ok(cfg)
}
