//! `MediaTools` backed by the ffmpeg and ffprobe binaries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{list_sequence, CaptureArgs, CaptureOutput, MediaTools, Quality};
use crate::config::CaptureConfig;

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    /// Value of ffmpeg's `-headers` option (CRLF separated).
    headers: String,
}

impl Ffmpeg {
    pub fn new(cfg: &CaptureConfig) -> Self {
        let headers = cfg
            .request_headers()
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\r\n");
        Self {
            ffmpeg: cfg.ffmpeg_path.clone(),
            ffprobe: cfg.ffprobe_path.clone(),
            headers,
        }
    }

    /// Full argument list of a capture, without the program name.
    pub fn capture_args(&self, args: &CaptureArgs) -> Vec<String> {
        let mut out: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(),
            "fatal".into(),
            "-headers".into(),
            self.headers.clone(),
            "-i".into(),
            args.input.clone(),
        ];
        if let Some(secs) = args.duration_secs {
            out.push("-t".into());
            out.push(secs.to_string());
        }
        match &args.output {
            CaptureOutput::Segmented {
                pattern,
                segment_secs,
            } => {
                out.extend(
                    [
                        "-f",
                        "segment",
                        "-segment_time",
                        &segment_secs.to_string(),
                        "-reset_timestamps",
                        "1",
                        "-c",
                        "copy",
                        "-map",
                        "0",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                out.push(pattern.to_string_lossy().into_owned());
            }
            CaptureOutput::Single(path) => {
                out.extend(
                    ["-map", "0:v?", "-map", "0:a?", "-map", "0:s?", "-c", "copy"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                out.push(path.to_string_lossy().into_owned());
            }
        }
        out
    }

    async fn ffprobe(&self, path: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.ffprobe.display()))?;
        if !output.status.success() {
            bail!(
                "ffprobe {} failed: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn ffmpeg(&self, args: Vec<String>, what: &str) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.ffmpeg.display()))?;
        if !output.status.success() {
            bail!(
                "{} failed ({}): {}",
                what,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTools for Ffmpeg {
    fn capture_command(&self, args: &CaptureArgs) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(self.capture_args(args))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn extract_thumbnail(&self, src: &Path, dst: &Path) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            src.to_string_lossy().into_owned(),
            "-ss".into(),
            "00:00:01".into(),
            "-vframes".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            "-vf".into(),
            "scale=320:-1".into(),
            dst.to_string_lossy().into_owned(),
        ];
        self.ffmpeg(args, "thumbnail extraction").await
    }

    async fn media_duration(&self, path: &Path) -> Result<f64> {
        let out = self
            .ffprobe(
                path,
                &[
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
            )
            .await?;
        let secs: f64 = out
            .parse()
            .with_context(|| format!("invalid duration '{}' for {}", out, path.display()))?;
        Ok(secs)
    }

    async fn media_quality(&self, path: &Path) -> Result<Quality> {
        let out = self
            .ffprobe(
                path,
                &[
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height",
                    "-of",
                    "csv=s=x:p=0",
                ],
            )
            .await?;
        Ok(Quality::from_resolution(&out))
    }

    async fn split(&self, src: &Path, segment_secs: u64, pattern: &Path) -> Result<Vec<PathBuf>> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            src.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            "-map".into(),
            "0".into(),
            "-f".into(),
            "segment".into(),
            "-segment_time".into(),
            segment_secs.max(1).to_string(),
            "-reset_timestamps".into(),
            "1".into(),
            pattern.to_string_lossy().into_owned(),
        ];
        self.ffmpeg(args, "split").await?;
        let parts = list_sequence(pattern)
            .with_context(|| format!("listing parts of {}", pattern.display()))?;
        if parts.is_empty() {
            bail!("split of {} produced no parts", src.display());
        }
        Ok(parts)
    }
}
