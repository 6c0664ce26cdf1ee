//! `tvrec daemon` – long-running scheduler behind the control socket.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tvrec_core::config::TvrecConfig;
use tvrec_core::scheduler::JobEvent;

use crate::cli::{control_socket, engine};

pub async fn run_daemon(cfg: TvrecConfig) -> Result<()> {
    let (scheduler, sink) = engine::build(cfg)?;
    let socket_path = control_socket::default_socket_path()?;
    let listener = control_socket::spawn_control_listener(scheduler.clone(), sink, &socket_path)?;
    tracing::info!(path = %socket_path.display(), "control socket listening");
    println!("tvrec daemon listening on {}", socket_path.display());

    let mut events = scheduler.subscribe();
    let journal = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Phase { id, phase }) => println!("job {id}: {}", phase.as_str()),
                Ok(JobEvent::Delivered { id, report }) => {
                    for unit in &report.units {
                        println!(
                            "job {id}: delivered {} ({} bytes, {} attempt(s))",
                            unit.file_name, unit.bytes, unit.attempts
                        );
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "event journal lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    shutdown_signal().await?;
    let cancelled = scheduler.cancel_all().await;
    tracing::info!(cancelled, "daemon shutting down");
    listener.abort();
    journal.abort();
    let _ = std::fs::remove_file(&socket_path);
    if cancelled > 0 {
        println!("Cancelled {cancelled} running job(s)");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
