//! Locating the downloader binary and optional helper runtimes on the host.

use std::env;
use std::path::{Path, PathBuf};

/// File name of the downloader on this platform.
pub const DOWNLOADER_NAME: &str = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };

/// JavaScript runtime the downloader can use to solve signature challenges.
pub const JS_RUNTIME: &str = "node";

/// Resolve the downloader path.
///
/// Order: the explicit path, a copy next to the running binary, the first
/// match on `PATH`, and finally the bare name (left for the OS to resolve,
/// so a missing binary surfaces as a spawn error on the task).
pub fn locate_downloader(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(sibling) = sibling_of_current_exe(DOWNLOADER_NAME) {
        return sibling;
    }
    find_in_path(DOWNLOADER_NAME).unwrap_or_else(|| PathBuf::from(DOWNLOADER_NAME))
}

/// Returns the runtime name to hand to the downloader when one is installed.
pub fn detect_js_runtime() -> Option<String> {
    find_in_path(JS_RUNTIME).map(|_| JS_RUNTIME.to_string())
}

/// First regular file called `name` in the `PATH` directories.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) && Path::new(name).extension().is_none() {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

fn sibling_of_current_exe(name: &str) -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    let candidate = exe.parent()?.join(name);
    candidate.is_file().then_some(candidate)
}
