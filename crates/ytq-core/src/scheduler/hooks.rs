//! Routes supervisor callbacks back into the scheduler.

use std::sync::Weak;

use super::Inner;
use crate::supervisor::{ProgressUpdate, TaskEvents};
use crate::task::{Task, TaskId};

/// Events for one task in one admission cycle.
///
/// Holds the scheduler weakly so a dropped scheduler does not stay alive
/// through its own supervisors.
pub(super) struct TaskHooks {
    inner: Weak<Inner>,
    id: TaskId,
    generation: u64,
}

impl TaskHooks {
    pub(super) fn new(inner: Weak<Inner>, id: TaskId, generation: u64) -> Self {
        Self {
            inner,
            id,
            generation,
        }
    }

    /// Apply a non-terminal update if this cycle still owns the task.
    fn update(&self, apply: impl FnOnce(&mut Task) -> bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let changed = {
            let mut book = inner.book();
            if !book.is_current(self.id, self.generation) {
                return;
            }
            book.task_mut(self.id).map_or(false, apply)
        };
        if changed {
            inner.notify(self.id);
        }
    }

    /// Free the slot first, then record the terminal state, then admit.
    fn finish(&self, apply: impl FnOnce(&mut Task) -> bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let changed = {
            let mut book = inner.book();
            if !book.is_current(self.id, self.generation) {
                tracing::debug!(task = %self.id, "dropping stale terminal callback");
                return;
            }
            book.running.remove(&self.id);
            book.task_mut(self.id).map_or(false, apply)
        };
        if changed {
            inner.notify(self.id);
        }
        Inner::admit(&inner);
    }
}

impl TaskEvents for TaskHooks {
    fn progress(&self, update: ProgressUpdate) {
        self.update(|task| task.record_progress(&update));
    }

    fn title(&self, title: String) {
        self.update(|task| task.set_title(title));
    }

    fn notice(&self, message: String) {
        tracing::info!(task = %self.id, "{message}");
        self.update(|task| task.set_notice(message));
    }

    fn complete(&self) {
        tracing::info!(task = %self.id, "completed");
        self.finish(|task| task.complete());
    }

    fn error(&self, message: String) {
        tracing::info!(task = %self.id, "failed: {message}");
        self.finish(|task| task.fail(message));
    }
}
