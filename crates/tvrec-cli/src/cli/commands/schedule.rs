//! `tvrec schedule <stream> <date> <time>` – capture at a given local time.

use anyhow::Result;
use tvrec_core::config::TvrecConfig;
use tvrec_core::job::parse_start_time;

use super::record::wait_or_interrupt;
use crate::cli::{control_socket, engine, JobArgs};

pub async fn run_schedule(
    cfg: TvrecConfig,
    stream: &str,
    date: &str,
    time: &str,
    args: &JobArgs,
) -> Result<()> {
    let at = parse_start_time(&format!("{} {}", date, time))?;
    let spec = args.to_spec(stream);
    if args.daemon {
        let line = format!("schedule {} {} {}", date, time, serde_json::to_string(&spec)?);
        let id = control_socket::request(&control_socket::default_socket_path()?, &line).await?;
        println!("Scheduled job {id} for {date} {time}");
        return Ok(());
    }
    let owner = spec.owner;
    let (scheduler, sink) = engine::build(cfg)?;
    let ticket = scheduler.submit_at(spec, sink, at)?;
    println!("Job {} scheduled for {date} {time}", ticket.id);
    wait_or_interrupt(&scheduler, ticket, owner).await
}
