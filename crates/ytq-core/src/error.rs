//! Errors surfaced to operators when a downloader cannot be launched.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to start the downloader for a task.
///
/// The `Display` text is what ends up in the task's error field, so it is
/// written for the person running the queue.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A static cookie file is configured but does not exist.
    #[error("cookie file not found at {}; re-import the cookie file", .0.display())]
    CookieFileMissing(PathBuf),

    /// The OS refused to create the process (missing binary, permissions, ...).
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
