//! Spawn, read, classify, reap.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::classify::{classify_line, LineEvent};
use super::launch::{self, LaunchPlan};
use super::{StopRequest, Supervisor, FALLBACK_NOTICE, TERMINATE_GRACE};
use crate::error::LaunchError;

/// A live process and the merged lines of its stdout and stderr.
struct Running {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

pub(super) async fn run(sup: Arc<Supervisor>, mut stops: mpsc::UnboundedReceiver<StopRequest>) {
    if sup.is_cancelled() {
        tracing::debug!(url = %sup.url, "cancelled before start");
        return;
    }

    let plan = match LaunchPlan::build(&sup.settings, &sup.url) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(url = %sup.url, "cannot launch: {e}");
            report_error(&sup, e.to_string());
            return;
        }
    };
    let mut fallback = plan.fallback;

    let mut running = match spawn(&sup, &plan.primary) {
        Ok(running) => running,
        Err(e) => {
            tracing::warn!(url = %sup.url, "{e}");
            report_error(&sup, e.to_string());
            return;
        }
    };

    loop {
        tokio::select! {
            line = running.lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(url = %sup.url, "{line}");

                match classify_line(line, fallback.is_some()) {
                    LineEvent::BrowserCookieFailure => {
                        let Some(args) = fallback.take() else {
                            continue;
                        };
                        sup.flags().fallback_used = true;
                        tracing::warn!(url = %sup.url, "browser cookies failed; restarting with the cookie file");
                        request_stop(&sup, &mut running.child);
                        await_exit(&sup, &mut running.child).await;
                        if sup.is_cancelled() {
                            return;
                        }
                        match spawn(&sup, &args) {
                            Ok(next) => {
                                running = next;
                                sup.events.notice(FALLBACK_NOTICE.to_string());
                            }
                            Err(e) => {
                                tracing::warn!(url = %sup.url, "{e}");
                                report_error(&sup, e.to_string());
                                return;
                            }
                        }
                    }
                    LineEvent::Fatal(kind) => {
                        let first = {
                            let mut flags = sup.flags();
                            !std::mem::replace(&mut flags.aborted, true)
                        };
                        if !first {
                            continue;
                        }
                        tracing::info!(url = %sup.url, ?kind, "fatal downloader output");
                        request_stop(&sup, &mut running.child);
                        report_error(&sup, kind.message().to_string());
                        await_exit(&sup, &mut running.child).await;
                        return;
                    }
                    LineEvent::Progress(update) => sup.events.progress(update),
                    LineEvent::Destination(title) => sup.events.title(title),
                    LineEvent::Other => {}
                }
            }
            Some(stop) = stops.recv() => apply_stop(&sup, &mut running.child, stop),
        }
    }

    let status = loop {
        tokio::select! {
            status = running.child.wait() => break status,
            Some(stop) = stops.recv() => apply_stop(&sup, &mut running.child, stop),
        }
    };
    clear_pid(&sup);

    if sup.is_cancelled() {
        tracing::info!(url = %sup.url, "downloader stopped after cancel");
        return;
    }
    match status {
        Ok(status) if status.success() => {
            tracing::info!(url = %sup.url, "download finished");
            sup.events.complete();
        }
        Ok(status) => {
            let message = exit_message(status);
            tracing::info!(url = %sup.url, "{message}");
            sup.events.error(message);
        }
        Err(e) => {
            tracing::warn!(url = %sup.url, "wait failed: {e}");
            sup.events.error(format!("failed to wait for process: {e}"));
        }
    }
}

fn spawn(sup: &Supervisor, args: &[OsString]) -> Result<Running, LaunchError> {
    let exe = &sup.settings.executable;
    tracing::info!(url = %sup.url, "starting: {}", launch::redact(&exe.program, args));

    let mut child = Command::new(&exe.program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: exe.program.clone(),
            source,
        })?;

    let (tx, lines) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx));
    }

    let mut flags = sup.flags();
    flags.pid = child.id();
    // A restart while paused keeps the new process stopped too.
    if flags.paused {
        if let Some(pid) = flags.pid {
            if let Err(e) = sup.signals.suspend(pid) {
                tracing::warn!(pid, "failed to suspend restarted downloader: {e}");
                flags.paused = false;
            }
        }
    }
    Ok(Running { child, lines })
}

/// Forward lines until EOF. Invalid UTF-8 is replaced, never fatal.
async fn pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("output stream closed: {e}");
                break;
            }
        }
    }
}

fn apply_stop(sup: &Supervisor, child: &mut Child, stop: StopRequest) {
    let result = match stop {
        StopRequest::Terminate => sup.signals.terminate(child),
        StopRequest::Kill => child.start_kill(),
    };
    if let Err(e) = result {
        tracing::warn!(url = %sup.url, ?stop, "stop request failed: {e}");
    }
}

/// Continue the process if paused, then ask it to terminate.
fn request_stop(sup: &Supervisor, child: &mut Child) {
    let paused_pid = {
        let mut flags = sup.flags();
        let pid = if flags.paused { flags.pid } else { None };
        flags.paused = false;
        pid
    };
    if let Some(pid) = paused_pid {
        let _ = sup.signals.resume(pid);
    }
    if let Err(e) = sup.signals.terminate(child) {
        tracing::warn!(url = %sup.url, "terminate failed: {e}");
    }
}

/// Wait up to the grace period, then kill. The pid is cleared once reaped so
/// no signal can reach a recycled pid.
async fn await_exit(sup: &Supervisor, child: &mut Child) {
    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        tracing::warn!(url = %sup.url, "downloader did not exit in time; killing");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
    clear_pid(sup);
}

fn clear_pid(sup: &Supervisor) {
    let mut flags = sup.flags();
    flags.pid = None;
    flags.paused = false;
}

/// Deliver the error hook unless the run was cancelled.
fn report_error(sup: &Supervisor, message: String) {
    if sup.is_cancelled() {
        return;
    }
    sup.events.error(message);
}

fn exit_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("process exited with code {code}"),
        None => "process was terminated by a signal".to_string(),
    }
}
