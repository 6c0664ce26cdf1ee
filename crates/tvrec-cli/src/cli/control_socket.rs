//! Control socket: server (during `tvrec daemon`) and client (for `tvrec cancel`,
//! `tvrec status` and `--daemon` submissions).
//!
//! Protocol: one request line, one reply line.
//!
//! - `submit <job json>`
//! - `schedule <DD-MM-YYYY> <HH:MM:SS> <job json>`
//! - `cancel <id> <requester>`
//! - `status`
//!
//! Replies are `ok <payload>` or `error <message>`; the status payload is a
//! JSON array of job summaries.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tvrec_core::job::{parse_start_time, JobId, JobSpec, OwnerId};
use tvrec_core::logging;
use tvrec_core::scheduler::Scheduler;
use tvrec_core::status::StatusSink;

#[derive(Debug)]
pub enum ControlRequest {
    Submit(JobSpec),
    Schedule { at: DateTime<Local>, spec: JobSpec },
    Cancel { id: JobId, requester: OwnerId },
    Status,
}

/// `$XDG_STATE_HOME/tvrec/control.sock`.
pub fn default_socket_path() -> Result<PathBuf> {
    Ok(logging::state_dir()?.join("control.sock"))
}

fn parse_spec(json: &str) -> Result<JobSpec, String> {
    serde_json::from_str(json.trim()).map_err(|e| format!("invalid job json: {}", e))
}

pub fn parse_request(line: &str) -> Result<ControlRequest, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "submit" => parse_spec(rest).map(ControlRequest::Submit),
        "schedule" => {
            let mut parts = rest.splitn(3, ' ');
            let (date, time, json) = match (parts.next(), parts.next(), parts.next()) {
                (Some(d), Some(t), Some(j)) => (d, t, j),
                _ => return Err("usage: schedule <DD-MM-YYYY> <HH:MM:SS> <json>".to_string()),
            };
            let at = parse_start_time(&format!("{} {}", date, time)).map_err(|e| e.to_string())?;
            Ok(ControlRequest::Schedule {
                at,
                spec: parse_spec(json)?,
            })
        }
        "cancel" => {
            let mut parts = rest.split_whitespace();
            let id = parts.next().ok_or("usage: cancel <id> <requester>")?;
            let requester = match parts.next() {
                Some(r) => r
                    .parse::<i64>()
                    .map_err(|_| format!("invalid requester {:?}", r))?,
                None => return Err("usage: cancel <id> <requester>".to_string()),
            };
            Ok(ControlRequest::Cancel {
                id: JobId::from(id),
                requester: OwnerId(requester),
            })
        }
        "status" if rest.is_empty() => Ok(ControlRequest::Status),
        _ => Err(format!("unknown command {:?}", verb)),
    }
}

/// Executes one request against the scheduler and renders the reply line.
pub async fn handle(scheduler: &Scheduler, sink: &Arc<dyn StatusSink>, req: ControlRequest) -> String {
    match req {
        ControlRequest::Submit(spec) => match scheduler.submit_now(spec, Arc::clone(sink)) {
            Ok(ticket) => format!("ok {}", ticket.id),
            Err(e) => format!("error {}", e),
        },
        ControlRequest::Schedule { at, spec } => {
            match scheduler.submit_at(spec, Arc::clone(sink), at) {
                Ok(ticket) => format!("ok {}", ticket.id),
                Err(e) => format!("error {}", e),
            }
        }
        ControlRequest::Cancel { id, requester } => match scheduler.cancel(&id, requester).await {
            Ok(true) => format!("ok {}", id),
            Ok(false) => format!("error unknown job {}", id),
            Err(e) => format!("error {}", e),
        },
        ControlRequest::Status => match serde_json::to_string(&scheduler.list_active()) {
            Ok(json) => format!("ok {}", json),
            Err(e) => format!("error {}", e),
        },
    }
}

/// Spawns a task that listens on `path` and serves control requests.
pub fn spawn_control_listener(
    scheduler: Scheduler,
    sink: Arc<dyn StatusSink>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    let sink = Arc::clone(&sink);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let reply = match parse_request(&line) {
                                Ok(req) => handle(&scheduler, &sink, req).await,
                                Err(e) => format!("error {}", e),
                            };
                            tracing::debug!(request = %line.trim(), reply = %reply, "control request");
                            if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(task)
}

/// Sends one request line and returns the `ok` payload.
pub async fn request(socket_path: &Path, line: &str) -> Result<String> {
    let stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "connect to {} (is `tvrec daemon` running?)",
            socket_path.display()
        )
    })?;
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{}\n", line.trim()).as_bytes()).await?;
    write.shutdown().await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("daemon closed the connection without replying")?;
    if let Some(payload) = reply.strip_prefix("ok") {
        return Ok(payload.trim_start().to_string());
    }
    match reply.strip_prefix("error") {
        Some(msg) => bail!("{}", msg.trim()),
        None => bail!("unexpected reply {:?}", reply),
    }
}
