//! `ytq status` – show all tasks of the running queue.

use anyhow::{Context, Result};
use ytq_core::control::{default_control_socket_path, ControlCommand};
use ytq_core::Task;

use crate::cli::control_socket;

pub async fn run_status(json: bool) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, &ControlCommand::List).await?;
    if json {
        println!("{reply}");
        return Ok(());
    }
    let tasks: Vec<Task> =
        serde_json::from_str(&reply).with_context(|| format!("unexpected reply: {reply}"))?;
    if tasks.is_empty() {
        println!("No tasks.");
    } else {
        println!("{:<6} {:<12} {:>7} {:<12} {}", "ID", "STATE", "DONE", "SPEED", "TITLE");
        for t in &tasks {
            println!("{}", format_row(t));
        }
    }
    Ok(())
}

pub(crate) fn format_row(t: &Task) -> String {
    let speed = if t.speed.is_empty() { "-" } else { t.speed.as_str() };
    let mut row = format!(
        "{:<6} {:<12} {:>6.1}% {:<12} {}",
        t.id,
        t.status.as_str(),
        t.progress,
        speed,
        t.display_name()
    );
    if let Some(err) = &t.error {
        row.push_str(&format!("  ({err})"));
    } else if let Some(notice) = &t.notice {
        row.push_str(&format!("  [{notice}]"));
    }
    row
}
