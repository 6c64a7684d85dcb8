//! Suspend, resume and terminate for child processes.
//!
//! On unix these are SIGSTOP, SIGCONT and SIGTERM. Elsewhere there is no way to
//! freeze a process, so suspend/resume only log and the caller keeps its
//! "paused" bookkeeping while the process runs on.

use std::io;
use std::sync::Arc;
use tokio::process::Child;

/// Platform backend for controlling a running downloader.
pub trait ProcessSignals: Send + Sync {
    fn suspend(&self, pid: u32) -> io::Result<()>;
    fn resume(&self, pid: u32) -> io::Result<()>;
    /// Ask the process to exit. Callers escalate to a kill after a grace period.
    fn terminate(&self, child: &mut Child) -> io::Result<()>;
    /// False when `suspend` does not actually stop the process.
    fn supports_suspend(&self) -> bool;
}

/// The backend for the current platform.
pub fn platform_signals() -> Arc<dyn ProcessSignals> {
    #[cfg(unix)]
    {
        Arc::new(PosixSignals)
    }
    #[cfg(not(unix))]
    {
        Arc::new(BestEffortSignals)
    }
}

#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixSignals;

#[cfg(unix)]
impl PosixSignals {
    fn send(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        let r = unsafe { libc::kill(pid, signal) };
        if r == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(unix)]
impl ProcessSignals for PosixSignals {
    fn suspend(&self, pid: u32) -> io::Result<()> {
        Self::send(pid, libc::SIGSTOP)
    }

    fn resume(&self, pid: u32) -> io::Result<()> {
        Self::send(pid, libc::SIGCONT)
    }

    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        match child.id() {
            Some(pid) => Self::send(pid, libc::SIGTERM),
            // Already reaped.
            None => Ok(()),
        }
    }

    fn supports_suspend(&self) -> bool {
        true
    }
}

#[cfg(not(unix))]
#[derive(Debug, Default, Clone, Copy)]
pub struct BestEffortSignals;

#[cfg(not(unix))]
impl ProcessSignals for BestEffortSignals {
    fn suspend(&self, pid: u32) -> io::Result<()> {
        tracing::warn!(pid, "suspend is not supported on this platform; process keeps running");
        Ok(())
    }

    fn resume(&self, pid: u32) -> io::Result<()> {
        tracing::debug!(pid, "resume is a no-op on this platform");
        Ok(())
    }

    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        child.start_kill()
    }

    fn supports_suspend(&self) -> bool {
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn suspend_resume_terminate_sleep() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let signals = platform_signals();
        assert!(signals.supports_suspend());

        signals.suspend(pid).unwrap();
        signals.resume(pid).unwrap();
        signals.terminate(&mut child).unwrap();

        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn signalling_missing_pid_errors() {
        // Larger than any default pid_max.
        assert!(PosixSignals.suspend(99_999_999).is_err());
    }
}
