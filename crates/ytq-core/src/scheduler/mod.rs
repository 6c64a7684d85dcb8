//! Bounded task scheduler.
//!
//! Owns the ordered task list and the running map (task id to supervisor) behind
//! one mutex. Admission reserves a slot under the lock by flipping a queued task
//! to downloading, then starts the supervisor outside the lock. Supervisor
//! callbacks come back through [`hooks::TaskHooks`].

mod hooks;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::supervisor::{platform_signals, LaunchSettings, ProcessSignals, Supervisor};
use crate::task::{Task, TaskId, TaskStatus};
use hooks::TaskHooks;

/// Called with the id of every task whose snapshot changed.
pub type Observer = Arc<dyn Fn(TaskId) + Send + Sync>;

/// Cheap to clone; all clones drive the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    book: Mutex<Book>,
    max_concurrent: usize,
    launch: Arc<LaunchSettings>,
    signals: Arc<dyn ProcessSignals>,
    observer: Option<Observer>,
    runtime: Handle,
}

#[derive(Default)]
struct Book {
    /// Insertion order is admission order.
    tasks: Vec<Task>,
    /// Exactly the downloading and paused tasks.
    running: HashMap<TaskId, RunningTask>,
    next_id: u64,
    next_generation: u64,
    /// Set by shutdown; no further admissions.
    closed: bool,
}

struct RunningTask {
    /// Admission cycle; callbacks from older cycles are dropped.
    generation: u64,
    supervisor: Arc<Supervisor>,
}

impl Book {
    fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn is_current(&self, id: TaskId, generation: u64) -> bool {
        self.running.get(&id).map(|r| r.generation) == Some(generation)
    }

    fn supervisor_if(&self, id: TaskId, status: TaskStatus) -> Option<Arc<Supervisor>> {
        if self.task(id)?.status != status {
            return None;
        }
        self.running.get(&id).map(|r| Arc::clone(&r.supervisor))
    }
}

impl Scheduler {
    /// Create a scheduler running at most `max_concurrent` downloads (at least one).
    ///
    /// Must be called inside a Tokio runtime; supervisors are spawned on it.
    pub fn new(launch: LaunchSettings, max_concurrent: usize) -> Result<Self> {
        Self::build(launch, max_concurrent, None)
    }

    /// Like [`Scheduler::new`], notifying `observer` after every task change.
    pub fn with_observer<F>(launch: LaunchSettings, max_concurrent: usize, observer: F) -> Result<Self>
    where
        F: Fn(TaskId) + Send + Sync + 'static,
    {
        Self::build(launch, max_concurrent, Some(Arc::new(observer)))
    }

    fn build(launch: LaunchSettings, max_concurrent: usize, observer: Option<Observer>) -> Result<Self> {
        let runtime = Handle::try_current()
            .context("the scheduler must be created inside a Tokio runtime")?;
        Ok(Self {
            inner: Arc::new(Inner {
                book: Mutex::new(Book::default()),
                max_concurrent: max_concurrent.max(1),
                launch: Arc::new(launch),
                signals: platform_signals(),
                observer,
                runtime,
            }),
        })
    }

    /// Queue a download and return its id. The process starts asynchronously.
    pub fn enqueue(&self, url: impl Into<String>) -> TaskId {
        let url = url.into();
        let id = {
            let mut book = self.inner.book();
            book.next_id += 1;
            let id = TaskId::new(book.next_id);
            book.tasks.push(Task::new(id, url.clone()));
            id
        };
        tracing::info!(task = %id, %url, "queued");
        self.inner.notify(id);
        Inner::admit(&self.inner);
        id
    }

    /// Suspend a downloading task. False if the task is unknown, not
    /// downloading, or has no live process yet.
    pub fn pause(&self, id: TaskId) -> bool {
        let Some(sup) = self.inner.book().supervisor_if(id, TaskStatus::Downloading) else {
            return false;
        };
        if !sup.pause() {
            return false;
        }
        let changed = self
            .inner
            .book()
            .task_mut(id)
            .map_or(false, |task| task.pause());
        if changed {
            tracing::info!(task = %id, "paused");
            self.inner.notify(id);
        }
        changed
    }

    /// Continue a paused task.
    pub fn resume(&self, id: TaskId) -> bool {
        let Some(sup) = self.inner.book().supervisor_if(id, TaskStatus::Paused) else {
            return false;
        };
        if !sup.resume() {
            return false;
        }
        let changed = self
            .inner
            .book()
            .task_mut(id)
            .map_or(false, |task| task.resume());
        if changed {
            tracing::info!(task = %id, "resumed");
            self.inner.notify(id);
        }
        changed
    }

    /// Cancel a queued, downloading or paused task. A running task's slot frees
    /// immediately and its process is stopped in the background; a queued task
    /// just leaves the queue.
    pub fn cancel(&self, id: TaskId) -> bool {
        let supervisor = {
            let mut book = self.inner.book();
            let cancelled = book.task_mut(id).map_or(false, |task| task.cancel());
            if !cancelled {
                return false;
            }
            book.running.remove(&id).map(|r| r.supervisor)
        };
        tracing::info!(task = %id, "cancelled");
        self.inner.notify(id);
        if let Some(sup) = supervisor {
            self.inner.runtime.spawn(async move { sup.cancel().await });
        }
        Inner::admit(&self.inner);
        true
    }

    /// Requeue a completed, failed or cancelled task at its original position.
    pub fn retry(&self, id: TaskId) -> bool {
        let requeued = self
            .inner
            .book()
            .task_mut(id)
            .map_or(false, |task| task.requeue());
        if !requeued {
            return false;
        }
        tracing::info!(task = %id, "requeued");
        self.inner.notify(id);
        Inner::admit(&self.inner);
        true
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.book().task(id).cloned()
    }

    /// Snapshots in insertion order.
    pub fn list(&self) -> Vec<Task> {
        self.inner.book().tasks.clone()
    }

    /// Number of tasks holding a slot.
    pub fn running_count(&self) -> usize {
        self.inner.book().running.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// True when no task is queued, downloading or paused.
    pub fn is_idle(&self) -> bool {
        self.inner
            .book()
            .tasks
            .iter()
            .all(|t| t.status.is_terminal())
    }

    /// Stop admitting, cancel every running task and wait for the processes to exit.
    /// Queued tasks stay queued.
    pub async fn shutdown(&self) {
        let stopping: Vec<(TaskId, Arc<Supervisor>)> = {
            let mut book = self.inner.book();
            book.closed = true;
            let running: Vec<(TaskId, RunningTask)> = book.running.drain().collect();
            running
                .into_iter()
                .map(|(id, entry)| {
                    if let Some(task) = book.task_mut(id) {
                        task.cancel();
                    }
                    (id, entry.supervisor)
                })
                .collect()
        };
        if stopping.is_empty() {
            return;
        }
        tracing::info!(count = stopping.len(), "shutting down running downloads");

        let mut set = JoinSet::new();
        for (id, sup) in stopping {
            self.inner.notify(id);
            set.spawn(async move { sup.cancel().await });
        }
        while set.join_next().await.is_some() {}
    }
}

impl Inner {
    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, id: TaskId) {
        if let Some(observer) = &self.observer {
            observer(id);
        }
    }

    /// Fill free slots with queued tasks in insertion order.
    ///
    /// Safe to call redundantly: the queued to downloading flip happens under
    /// the lock, so a task is never started twice.
    fn admit(inner: &Arc<Inner>) {
        let started: Vec<(TaskId, Arc<Supervisor>)> = {
            let mut book = inner.book();
            if book.closed {
                return;
            }
            let slots = inner.max_concurrent.saturating_sub(book.running.len());
            if slots == 0 {
                return;
            }
            let ids: Vec<TaskId> = book
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Queued)
                .take(slots)
                .map(|t| t.id)
                .collect();

            let mut started = Vec::with_capacity(ids.len());
            for id in ids {
                let url = match book.task_mut(id) {
                    Some(task) => {
                        if !task.admit() {
                            continue;
                        }
                        task.url.clone()
                    }
                    None => continue,
                };
                book.next_generation += 1;
                let generation = book.next_generation;
                let hooks = Arc::new(TaskHooks::new(Arc::downgrade(inner), id, generation));
                let sup = Supervisor::new(
                    url,
                    Arc::clone(&inner.launch),
                    Arc::clone(&inner.signals),
                    hooks,
                );
                book.running.insert(
                    id,
                    RunningTask {
                        generation,
                        supervisor: Arc::clone(&sup),
                    },
                );
                started.push((id, sup));
            }
            tracing::debug!(
                admitted = started.len(),
                running = book.running.len(),
                "admission pass"
            );
            started
        };

        for (id, sup) in started {
            tracing::info!(task = %id, url = sup.url(), "starting download");
            inner.runtime.spawn(sup.start());
            inner.notify(id);
        }
    }
}
