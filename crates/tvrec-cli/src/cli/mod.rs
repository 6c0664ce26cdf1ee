//! CLI for the tvrec capture scheduler.

mod commands;
mod console_sink;
mod control_socket;
mod engine;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tvrec_core::config;
use tvrec_core::job::{parse_duration, ChatId, JobId, JobSpec, OwnerId};

use commands::{
    run_cancel, run_completions, run_daemon, run_manpage, run_inspect, run_record, run_schedule,
    run_status,
};

/// Top-level CLI for tvrec.
#[derive(Debug, Parser)]
#[command(name = "tvrec")]
#[command(about = "tvrec: scheduled live-stream capture with segmenting and delivery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options shared by `record` and `schedule`.
#[derive(Debug, Clone, Args)]
pub struct JobArgs {
    /// Capture length: seconds, MM:SS or HH:MM:SS. 0 records until cancelled.
    #[arg(long, short = 'd', default_value = "0", value_parser = duration_arg)]
    pub duration: u64,

    /// Start a new file every D (same formats as --duration).
    #[arg(long, value_name = "D", value_parser = duration_arg)]
    pub split: Option<u64>,

    #[arg(long, default_value = "Untitled")]
    pub title: String,

    #[arg(long, default_value = "Direct Stream")]
    pub channel: String,

    /// Submitting user (checked when cancelling).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub owner: i64,

    /// Chat that receives the artifacts.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub chat: i64,

    /// Job identifier (default: current time in milliseconds).
    #[arg(long)]
    pub id: Option<String>,

    /// Hand the job to a running `tvrec daemon` instead of running it here.
    #[arg(long)]
    pub daemon: bool,
}

fn duration_arg(s: &str) -> Result<u64, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl JobArgs {
    pub fn to_spec(&self, stream: &str) -> JobSpec {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| chrono::Local::now().timestamp_millis().to_string());
        JobSpec {
            id: JobId::new(id),
            owner: OwnerId(self.owner),
            chat: ChatId(self.chat),
            stream_ref: stream.to_string(),
            title: self.title.clone(),
            channel: self.channel.clone(),
            duration_secs: self.duration,
            segment_secs: self.split,
            reply_to: None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Capture a stream now and deliver the result. Ctrl-C cancels.
    Record {
        /// Stream URL (HLS playlist or anything the capture tool accepts).
        stream: String,
        #[command(flatten)]
        job: JobArgs,
    },

    /// Capture a stream starting at a given local time.
    Schedule {
        stream: String,
        /// Start date, DD-MM-YYYY.
        date: String,
        /// Start time, HH:MM:SS.
        time: String,
        #[command(flatten)]
        job: JobArgs,
    },

    /// Run the scheduler with a control socket for submit/cancel/status.
    Daemon,

    /// Cancel a job held by the running daemon.
    Cancel {
        /// Job identifier.
        id: String,
        /// User asking for the cancel (job owner or an admin).
        #[arg(long, default_value_t = 0)]
        requester: i64,
    },

    /// List jobs held by the running daemon.
    Status,

    /// Print duration and quality of a media file.
    Inspect {
        path: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell),
            CliCommand::Manpage => return run_manpage(),
            command => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                match command {
                    CliCommand::Record { stream, job } => run_record(cfg, &stream, &job).await?,
                    CliCommand::Schedule {
                        stream,
                        date,
                        time,
                        job,
                    } => run_schedule(cfg, &stream, &date, &time, &job).await?,
                    CliCommand::Daemon => run_daemon(cfg).await?,
                    CliCommand::Cancel { id, requester } => run_cancel(&id, requester).await?,
                    CliCommand::Status => run_status().await?,
                    CliCommand::Inspect { path } => run_inspect(&cfg, &path).await?,
                    CliCommand::Completions { .. } | CliCommand::Manpage => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
