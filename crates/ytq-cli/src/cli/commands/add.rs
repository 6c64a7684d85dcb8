//! `ytq add <url>` – queue a URL in the running `ytq run`.

use anyhow::Result;
use ytq_core::control::{default_control_socket_path, ControlCommand};

use crate::cli::control_socket;

pub async fn run_add(url: &str) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, &ControlCommand::Add(url.to_string())).await?;
    if let Some(reason) = reply.strip_prefix("error: ") {
        anyhow::bail!("add rejected: {reason}");
    }
    println!("Added task {reply} for URL: {url}");
    Ok(())
}
