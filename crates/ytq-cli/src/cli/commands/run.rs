//! `ytq run` – run the queue until it is idle (or forever with `--stay`).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use ytq_core::config::{self, YtqConfig};
use ytq_core::control::default_control_socket_path;
use ytq_core::{executable, Executable, LaunchSettings, Scheduler, Task, TaskId, TaskStatus};

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct QueueArgs {
    pub urls: Vec<String>,
    pub jobs: Option<usize>,
    pub download_dir: Option<PathBuf>,
    pub stay: bool,
}

pub async fn run_queue(cfg: &YtqConfig, args: QueueArgs) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(dir) = args.download_dir {
        cfg.download_dir = dir;
    }
    let output_dir = cfg.resolved_download_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("create download directory {}", output_dir.display()))?;
    config::validate_download_dir(&output_dir)?;

    let program = executable::locate_downloader(cfg.executable.as_deref());
    let launch = LaunchSettings::from_config(&cfg, Executable::new(program));
    tracing::info!(
        downloader = %launch.executable.program.display(),
        dir = %output_dir.display(),
        careful = launch.careful,
        "starting queue"
    );
    let jobs = args.jobs.unwrap_or(cfg.max_concurrent).max(1);

    let (changed_tx, mut changed_rx) = tokio::sync::mpsc::unbounded_channel::<TaskId>();
    let scheduler = Scheduler::with_observer(launch, jobs, move |id| {
        let _ = changed_tx.send(id);
    })?;

    let socket_path = default_control_socket_path().ok();
    let listener = match &socket_path {
        Some(path) => match control_socket::spawn_control_listener(scheduler.clone(), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {e:#}");
                None
            }
        },
        None => None,
    };

    for url in &args.urls {
        scheduler.enqueue(url.as_str());
    }
    if args.urls.is_empty() && !args.stay {
        println!("No URLs given. Use --stay to wait for `ytq add`.");
    }

    let mut printer = ProgressPrinter::default();
    let mut idle_poll = tokio::time::interval(IDLE_POLL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(id) = changed_rx.recv() => {
                if let Some(task) = scheduler.get(id) {
                    if let Some(line) = printer.observe(&task, Instant::now()) {
                        println!("{line}");
                    }
                }
            }
            _ = idle_poll.tick() => {
                if !args.stay && scheduler.is_idle() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                println!("Interrupted; stopping running downloads...");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = socket_path {
        let _ = std::fs::remove_file(path);
    }

    let tasks = scheduler.list();
    if !tasks.is_empty() {
        println!("{}", summary(&tasks));
    }
    Ok(())
}

/// Turns task snapshots into output lines: every status change, progress at
/// most every [`PROGRESS_INTERVAL`] per task.
#[derive(Debug, Default)]
struct ProgressPrinter {
    seen: HashMap<TaskId, Seen>,
}

#[derive(Debug)]
struct Seen {
    status: TaskStatus,
    notice: Option<String>,
    title: Option<String>,
    last_print: Instant,
}

impl ProgressPrinter {
    fn observe(&mut self, task: &Task, now: Instant) -> Option<String> {
        let prev = self.seen.get(&task.id);
        let status_changed = prev.map_or(true, |s| s.status != task.status);
        let notice_changed = prev.map_or(task.notice.is_some(), |s| s.notice != task.notice);
        let title_changed = prev.map_or(false, |s| s.title != task.title);
        let due = prev.map_or(true, |s| now.duration_since(s.last_print) >= PROGRESS_INTERVAL);

        let line = if status_changed || notice_changed || title_changed {
            Some(describe(task))
        } else if task.status == TaskStatus::Downloading && due {
            Some(progress_line(task))
        } else {
            None
        };

        let last_print = match (&line, prev) {
            (None, Some(s)) => s.last_print,
            _ => now,
        };
        self.seen.insert(
            task.id,
            Seen {
                status: task.status,
                notice: task.notice.clone(),
                title: task.title.clone(),
                last_print,
            },
        );
        line
    }
}

fn describe(task: &Task) -> String {
    let mut line = match task.status {
        TaskStatus::Downloading => progress_line(task),
        TaskStatus::Failed => format!(
            "[{}] failed  {}: {}",
            task.id,
            task.display_name(),
            task.error.as_deref().unwrap_or("unknown error")
        ),
        status => format!("[{}] {}  {}", task.id, status, task.display_name()),
    };
    if let Some(notice) = &task.notice {
        line.push_str(&format!("  ({notice})"));
    }
    line
}

fn progress_line(task: &Task) -> String {
    let speed = if task.speed.is_empty() { "-" } else { task.speed.as_str() };
    let eta = if task.eta.is_empty() { "?" } else { task.eta.as_str() };
    format!(
        "[{}] downloading {:5.1}%  {}  ETA {}  {}",
        task.id,
        task.progress,
        speed,
        eta,
        task.display_name()
    )
}

fn summary(tasks: &[Task]) -> String {
    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
    let mut line = format!(
        "Done: {} completed, {} failed, {} cancelled",
        count(TaskStatus::Completed),
        count(TaskStatus::Failed),
        count(TaskStatus::Cancelled)
    );
    let queued = count(TaskStatus::Queued);
    if queued > 0 {
        line.push_str(&format!(", {queued} left queued"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, status: TaskStatus, progress: f64) -> Task {
        let mut t = Task::new(TaskId::new(id), "https://v.test/x");
        t.status = status;
        t.progress = progress;
        t
    }

    #[test]
    fn progress_is_throttled_but_status_changes_print() {
        let mut printer = ProgressPrinter::default();
        let t0 = Instant::now();

        let line = printer.observe(&task(1, TaskStatus::Downloading, 0.0), t0).unwrap();
        assert!(line.starts_with("[1] downloading"));

        assert!(printer
            .observe(&task(1, TaskStatus::Downloading, 10.0), t0 + Duration::from_millis(100))
            .is_none());

        let line = printer
            .observe(&task(1, TaskStatus::Downloading, 20.0), t0 + Duration::from_millis(600))
            .unwrap();
        assert!(line.contains("20.0%"));

        let line = printer
            .observe(&task(1, TaskStatus::Paused, 20.0), t0 + Duration::from_millis(650))
            .unwrap();
        assert!(line.starts_with("[1] paused"));
    }

    #[test]
    fn failed_line_carries_error() {
        let mut t = task(2, TaskStatus::Failed, 5.0);
        t.error = Some("process exited with code 1".into());
        assert_eq!(
            describe(&t),
            "[2] failed  https://v.test/x: process exited with code 1"
        );
    }

    #[test]
    fn summary_counts_states() {
        let tasks = vec![
            task(1, TaskStatus::Completed, 100.0),
            task(2, TaskStatus::Failed, 3.0),
            task(3, TaskStatus::Completed, 100.0),
            task(4, TaskStatus::Queued, 0.0),
        ];
        assert_eq!(
            summary(&tasks),
            "Done: 2 completed, 1 failed, 0 cancelled, 1 left queued"
        );
    }
}
