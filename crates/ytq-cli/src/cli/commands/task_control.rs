//! `ytq pause|resume|cancel|retry <id>` – forward a task command to `ytq run`.

use anyhow::Result;
use ytq_core::control::{default_control_socket_path, ControlCommand};
use ytq_core::TaskId;

use crate::cli::control_socket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl TaskAction {
    fn command(self, id: TaskId) -> ControlCommand {
        match self {
            TaskAction::Pause => ControlCommand::Pause(id),
            TaskAction::Resume => ControlCommand::Resume(id),
            TaskAction::Cancel => ControlCommand::Cancel(id),
            TaskAction::Retry => ControlCommand::Retry(id),
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            TaskAction::Pause => "Paused",
            TaskAction::Resume => "Resumed",
            TaskAction::Cancel => "Cancelled",
            TaskAction::Retry => "Requeued",
        }
    }

    /// States in which the command does something.
    fn precondition(self) -> &'static str {
        match self {
            TaskAction::Pause => "downloading",
            TaskAction::Resume => "paused",
            TaskAction::Cancel => "queued, downloading or paused",
            TaskAction::Retry => "completed, failed or cancelled",
        }
    }
}

pub async fn run_task_command(action: TaskAction, id: u64) -> Result<()> {
    let id = TaskId::new(id);
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, &action.command(id)).await?;
    match reply.as_str() {
        "ok" => println!("{} task {id}", action.past_tense()),
        "ignored" => println!(
            "Task {id} unchanged (unknown id, or not {})",
            action.precondition()
        ),
        other => anyhow::bail!("unexpected reply from ytq run: {other}"),
    }
    Ok(())
}
