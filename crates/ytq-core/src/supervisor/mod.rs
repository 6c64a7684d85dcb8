//! Process supervisor: owns one downloader process for one admission cycle.
//!
//! The supervisor is the only owner of the child handle. Commands from the
//! scheduler reach the process through signals (pause/resume, by pid) or the
//! stop channel (terminate/kill), which the supervise loop services.
//!
//! - [`launch`]: argument construction and credential selection.
//! - [`classify`]: output line classification.
//! - [`signals`]: platform stop/continue/terminate backends.
//! - `run`: the spawn and supervise loop.

pub mod classify;
pub mod events;
pub mod launch;
mod run;
pub mod signals;

pub use classify::{FatalKind, LineEvent, ProgressUpdate};
pub use events::TaskEvents;
pub use launch::{Credentials, Executable, LaunchPlan, LaunchSettings};
pub use signals::{platform_signals, ProcessSignals};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long a terminated process gets to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Notice set on a task whose browser cookies failed and was restarted.
pub const FALLBACK_NOTICE: &str = "browser cookies unavailable; retried with the cookie file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRequest {
    Terminate,
    Kill,
}

#[derive(Debug, Default)]
pub(crate) struct Flags {
    /// Present while a process is running.
    pub(crate) pid: Option<u32>,
    pub(crate) paused: bool,
    pub(crate) cancelled: bool,
    /// A fatal line already delivered the error hook.
    pub(crate) aborted: bool,
    pub(crate) fallback_used: bool,
}

pub struct Supervisor {
    url: String,
    settings: Arc<LaunchSettings>,
    signals: Arc<dyn ProcessSignals>,
    events: Arc<dyn TaskEvents>,
    flags: Mutex<Flags>,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    stop_rx: Mutex<Option<mpsc::UnboundedReceiver<StopRequest>>>,
    exited: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        url: impl Into<String>,
        settings: Arc<LaunchSettings>,
        signals: Arc<dyn ProcessSignals>,
        events: Arc<dyn TaskEvents>,
    ) -> Arc<Self> {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let (exited, _) = watch::channel(false);
        Arc::new(Self {
            url: url.into(),
            settings,
            signals,
            events,
            flags: Mutex::new(Flags::default()),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            exited,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the downloader and supervise it until it exits.
    ///
    /// Build and spawn failures are reported through the `error` hook. The
    /// future resolves when the last process has been reaped. Calling it twice
    /// is a no-op.
    pub async fn start(self: Arc<Self>) {
        let stops = {
            let mut slot = self.stop_rx.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        let Some(stops) = stops else {
            tracing::debug!(url = %self.url, "supervisor already started");
            return;
        };
        run::run(Arc::clone(&self), stops).await;
        self.exited.send_replace(true);
    }

    /// Stop the process. Returns false when there is no live process to stop
    /// or it is already paused.
    pub fn pause(&self) -> bool {
        let mut flags = self.flags();
        let Some(pid) = flags.pid else {
            return false;
        };
        if flags.paused || flags.cancelled {
            return false;
        }
        if let Err(e) = self.signals.suspend(pid) {
            tracing::warn!(pid, "failed to suspend downloader: {e}");
            return false;
        }
        if !self.signals.supports_suspend() {
            tracing::warn!(pid, "pause is bookkeeping only on this platform");
        }
        flags.paused = true;
        true
    }

    /// Continue a paused process. Returns false when it is not paused.
    pub fn resume(&self) -> bool {
        let mut flags = self.flags();
        if !flags.paused {
            return false;
        }
        let Some(pid) = flags.pid else {
            flags.paused = false;
            return false;
        };
        if let Err(e) = self.signals.resume(pid) {
            tracing::warn!(pid, "failed to resume downloader: {e}");
            return false;
        }
        flags.paused = false;
        true
    }

    /// Terminate the process and wait for it to go away.
    ///
    /// Suppresses both terminal hooks. A paused process is continued first so
    /// it can handle the termination signal. After [`TERMINATE_GRACE`] the
    /// process is killed.
    pub async fn cancel(&self) {
        let mut exited = self.exited.subscribe();
        let paused_pid = {
            let mut flags = self.flags();
            flags.cancelled = true;
            let pid = if flags.paused { flags.pid } else { None };
            flags.paused = false;
            pid
        };
        if let Some(pid) = paused_pid {
            if let Err(e) = self.signals.resume(pid) {
                tracing::warn!(pid, "failed to continue paused downloader before cancel: {e}");
            }
        }
        let _ = self.stop_tx.send(StopRequest::Terminate);

        // The watch guard is not Send; keep it out of scope across awaits.
        let timed_out = tokio::time::timeout(TERMINATE_GRACE, exited.wait_for(|done| *done))
            .await
            .is_err();
        if timed_out {
            tracing::warn!(url = %self.url, "downloader ignored termination; killing");
            let _ = self.stop_tx.send(StopRequest::Kill);
            let _ = tokio::time::timeout(TERMINATE_GRACE, exited.wait_for(|done| *done)).await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.flags().paused
    }

    /// True once the cookie-file restart has been used in this cycle.
    pub fn used_fallback(&self) -> bool {
        self.flags().fallback_used
    }

    /// True once the supervise loop has finished.
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    pub(crate) fn flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("url", &self.url)
            .field("flags", &*self.flags())
            .finish()
    }
}
