//! `tvrec record <stream>` – capture now, in this process or via the daemon.

use anyhow::{bail, Result};
use tvrec_core::config::TvrecConfig;
use tvrec_core::job::{JobPhase, OwnerId};
use tvrec_core::scheduler::{JobTicket, Scheduler};

use crate::cli::{control_socket, engine, JobArgs};

pub async fn run_record(cfg: TvrecConfig, stream: &str, args: &JobArgs) -> Result<()> {
    let spec = args.to_spec(stream);
    if args.daemon {
        let line = format!("submit {}", serde_json::to_string(&spec)?);
        let id = control_socket::request(&control_socket::default_socket_path()?, &line).await?;
        println!("Submitted job {id}");
        return Ok(());
    }
    let owner = spec.owner;
    let (scheduler, sink) = engine::build(cfg)?;
    let ticket = scheduler.submit_now(spec, sink)?;
    wait_or_interrupt(&scheduler, ticket, owner).await
}

/// Waits for the job to end; Ctrl-C cancels it and waits for its cleanup.
pub(super) async fn wait_or_interrupt(
    scheduler: &Scheduler,
    ticket: JobTicket,
    owner: OwnerId,
) -> Result<()> {
    let id = ticket.id.clone();
    let done = ticket.wait();
    tokio::pin!(done);
    let phase = tokio::select! {
        phase = &mut done => phase,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling job {id}...");
            scheduler.cancel(&id, owner).await?;
            done.await
        }
    };
    match phase {
        JobPhase::Completed => {
            println!("Job {id} completed");
            Ok(())
        }
        other => bail!("job {} ended {}", id, other.as_str()),
    }
}
