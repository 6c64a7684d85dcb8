//! Task identity, status, and the lifecycle state machine.
//!
//! A `Task` is a plain snapshot: it never holds the downloader process. The
//! scheduler mutates it through the transition methods below. Each returns
//! `false` and leaves the task untouched when the current status does not
//! allow the transition, which is how wrong-state commands become no-ops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::supervisor::ProgressUpdate;

/// Task identifier, unique within one scheduler and stable for the task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TaskId)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled tasks hold no slot and only leave via retry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Downloading and paused tasks occupy a concurrency slot.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Downloading | TaskStatus::Paused)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested download and its observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    /// Human title, learned from the downloader's destination line.
    pub title: Option<String>,
    pub status: TaskStatus,
    /// Percent complete in [0.0, 100.0].
    pub progress: f64,
    /// Transient speed display string from the last progress line.
    pub speed: String,
    /// Transient ETA display string from the last progress line.
    pub eta: String,
    /// Operator-facing message from the last failure.
    pub error: Option<String>,
    /// Non-fatal notice, e.g. that credentials fell back to the cookie file.
    pub notice: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: None,
            status: TaskStatus::Queued,
            progress: 0.0,
            speed: String::new(),
            eta: String::new(),
            error: None,
            notice: None,
        }
    }

    /// Title if known, otherwise the URL.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    pub(crate) fn admit(&mut self) -> bool {
        if self.status != TaskStatus::Queued {
            return false;
        }
        self.status = TaskStatus::Downloading;
        self.clear_rate();
        true
    }

    pub(crate) fn pause(&mut self) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }
        self.status = TaskStatus::Paused;
        true
    }

    pub(crate) fn resume(&mut self) -> bool {
        if self.status != TaskStatus::Paused {
            return false;
        }
        self.status = TaskStatus::Downloading;
        true
    }

    /// Process exited successfully. Accepted while paused too: on hosts without
    /// stop signals a "paused" process keeps running and may finish.
    pub(crate) fn complete(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100.0;
        self.clear_rate();
        true
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(message.into());
        self.clear_rate();
        true
    }

    /// Any non-terminal task can be cancelled, including one still queued.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.clear_rate();
        true
    }

    /// Back to the queue for a fresh admission cycle.
    pub(crate) fn requeue(&mut self) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Queued;
        self.progress = 0.0;
        self.error = None;
        self.notice = None;
        self.clear_rate();
        true
    }

    /// Progress never moves backwards within one run.
    pub(crate) fn record_progress(&mut self, update: &ProgressUpdate) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.progress = self.progress.max(update.percent.clamp(0.0, 100.0));
        self.speed = update.speed.clone();
        self.eta = update.eta.clone();
        true
    }

    pub(crate) fn set_title(&mut self, title: String) -> bool {
        if self.title.as_deref() == Some(title.as_str()) {
            return false;
        }
        self.title = Some(title);
        true
    }

    pub(crate) fn set_notice(&mut self, notice: String) -> bool {
        self.notice = Some(notice);
        true
    }

    fn clear_rate(&mut self) {
        self.speed.clear();
        self.eta.clear();
    }
}
