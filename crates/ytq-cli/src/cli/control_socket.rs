//! Control socket: server (during `ytq run`) and client (for `ytq pause` etc.).
//! Protocol: one command per line, one reply line per command; see
//! `ytq_core::control`.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use ytq_core::control::{self, ControlCommand};
use ytq_core::Scheduler;

/// Binds `path` (replacing a stale socket) and spawns a task that applies each
/// request line to `scheduler` and writes back the reply.
pub fn spawn_control_listener(
    scheduler: Scheduler,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let mut reply = control::handle_line(&scheduler, &line);
                            reply.push('\n');
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command to a running `ytq run` and returns its reply line.
pub async fn send_command(socket_path: &Path, command: &ControlCommand) -> Result<String> {
    if !socket_path.exists() {
        anyhow::bail!(
            "no running `ytq run` found (control socket {} does not exist)",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to control socket {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    let msg = format!("{}\n", command.to_line());
    write.write_all(msg.as_bytes()).await?;
    write.shutdown().await?;

    let mut lines = BufReader::new(read).lines();
    let reply = lines
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    Ok(reply)
}
