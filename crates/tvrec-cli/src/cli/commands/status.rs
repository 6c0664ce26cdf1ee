//! `tvrec status` – list jobs held by the running daemon.

use anyhow::Result;
use serde_json::Value;
use tvrec_core::status::captions::seconds_to_hms;

use crate::cli::control_socket;

fn duration_column(job: &Value) -> String {
    match job["duration_secs"].as_u64() {
        Some(0) | None => "unlimited".to_string(),
        Some(secs) => seconds_to_hms(secs as f64),
    }
}

pub(crate) fn format_rows(jobs: &[Value]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<16} {:<11} {:<8} {:<10} {}",
        "ID", "PHASE", "OWNER", "DURATION", "TITLE"
    )];
    for j in jobs {
        rows.push(format!(
            "{:<16} {:<11} {:<8} {:<10} {}",
            j["id"].as_str().unwrap_or("-"),
            j["phase"].as_str().unwrap_or("-"),
            j["owner"].to_string(),
            duration_column(j),
            j["title"].as_str().unwrap_or("")
        ));
    }
    rows
}

pub async fn run_status() -> Result<()> {
    let path = control_socket::default_socket_path()?;
    let payload = control_socket::request(&path, "status").await?;
    let jobs: Vec<Value> = serde_json::from_str(&payload)?;
    if jobs.is_empty() {
        println!("No active jobs.");
    } else {
        for row in format_rows(&jobs) {
            println!("{row}");
        }
    }
    Ok(())
}
