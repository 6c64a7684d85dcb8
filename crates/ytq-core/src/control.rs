//! Line protocol for driving a running scheduler from another process.
//!
//! One command per line: `add <url>`, `pause <id>`, `resume <id>`,
//! `cancel <id>`, `retry <id>`, `list`. The reply is one line: the new id for
//! `add`, a JSON array of task snapshots for `list`, `ok` or `ignored` for the
//! task commands, and `error: <reason>` for lines that do not parse.

use std::path::PathBuf;
use thiserror::Error;

use crate::scheduler::Scheduler;
use crate::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Add(String),
    Pause(TaskId),
    Resume(TaskId),
    Cancel(TaskId),
    Retry(TaskId),
    List,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("invalid task id `{0}`")]
    InvalidId(String),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ControlError::Empty);
        }
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };
        match verb {
            "list" => Ok(ControlCommand::List),
            "add" => {
                if arg.is_empty() {
                    return Err(ControlError::MissingArgument("add"));
                }
                Ok(ControlCommand::Add(arg.to_string()))
            }
            "pause" => parse_id("pause", arg).map(ControlCommand::Pause),
            "resume" => parse_id("resume", arg).map(ControlCommand::Resume),
            "cancel" => parse_id("cancel", arg).map(ControlCommand::Cancel),
            "retry" => parse_id("retry", arg).map(ControlCommand::Retry),
            other => Err(ControlError::Unknown(other.to_string())),
        }
    }

    /// Wire form, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            ControlCommand::Add(url) => format!("add {url}"),
            ControlCommand::Pause(id) => format!("pause {id}"),
            ControlCommand::Resume(id) => format!("resume {id}"),
            ControlCommand::Cancel(id) => format!("cancel {id}"),
            ControlCommand::Retry(id) => format!("retry {id}"),
            ControlCommand::List => "list".to_string(),
        }
    }

    /// Run against `scheduler` and produce the reply line.
    pub fn apply(&self, scheduler: &Scheduler) -> String {
        let applied = match self {
            ControlCommand::Add(url) => return scheduler.enqueue(url.as_str()).to_string(),
            ControlCommand::List => {
                return serde_json::to_string(&scheduler.list())
                    .unwrap_or_else(|e| format!("error: {e}"))
            }
            ControlCommand::Pause(id) => scheduler.pause(*id),
            ControlCommand::Resume(id) => scheduler.resume(*id),
            ControlCommand::Cancel(id) => scheduler.cancel(*id),
            ControlCommand::Retry(id) => scheduler.retry(*id),
        };
        let reply = if applied { "ok" } else { "ignored" };
        reply.to_string()
    }
}

/// Parse and apply one request line.
pub fn handle_line(scheduler: &Scheduler, line: &str) -> String {
    match ControlCommand::parse(line) {
        Ok(cmd) => {
            tracing::debug!(command = %cmd.to_line(), "control request");
            cmd.apply(scheduler)
        }
        Err(e) => format!("error: {e}"),
    }
}

fn parse_id(verb: &'static str, arg: &str) -> Result<TaskId, ControlError> {
    if arg.is_empty() {
        return Err(ControlError::MissingArgument(verb));
    }
    arg.parse()
        .map_err(|_| ControlError::InvalidId(arg.to_string()))
}

/// Default path for the control socket, in the XDG state dir next to the log.
pub fn default_control_socket_path() -> anyhow::Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ytq")?;
    Ok(xdg_dirs.place_state_file("control.sock")?)
}
