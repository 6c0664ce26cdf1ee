//! `tvrec cancel <id>` – cancel a job held by the running daemon.

use anyhow::Result;

use crate::cli::control_socket;

pub async fn run_cancel(id: &str, requester: i64) -> Result<()> {
    let path = control_socket::default_socket_path()?;
    control_socket::request(&path, &format!("cancel {} {}", id, requester)).await?;
    println!("Cancelled job {id}");
    Ok(())
}
