//! Downloader argument construction.
//!
//! A `LaunchPlan` is computed once per admission cycle, before spawn. When the
//! primary credentials come from a browser and a cookie file is configured, the
//! plan also carries the fallback argument set used by the one-shot restart.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::YtqConfig;
use crate::error::LaunchError;
use crate::executable;

/// Output file name template, relative to the download directory.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Progress line template; see `classify::parse_progress` for the consumer.
pub const PROGRESS_TEMPLATE: &str =
    "download:%(progress._percent_str)s %(progress._speed_str)s %(progress._eta_str)s";

/// Prefer mp4/m4a so the merge needs no re-encode.
pub const FORMAT_PREFERENCE: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b";

const CAREFUL_FLAGS: &[&str] = &[
    "--sleep-interval",
    "2",
    "--max-sleep-interval",
    "5",
    "--rate-limit",
    "5M",
];

/// The downloader invocation: a program plus arguments placed before our flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    pub program: PathBuf,
    pub prefix_args: Vec<OsString>,
}

impl Executable {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// e.g. `Executable::new("python3").with_prefix_args(["-m", "yt_dlp"])`.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// How the downloader authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    /// Static Netscape cookie file.
    File(PathBuf),
    /// Cookies read from an installed browser, with an optional cookie file to
    /// fall back to when the browser store cannot be read.
    Browser {
        browser: String,
        fallback_file: Option<PathBuf>,
    },
}

impl Credentials {
    pub fn from_config(cfg: &YtqConfig) -> Self {
        let file = cfg.resolved_cookies_path();
        if cfg.use_browser_cookies && !cfg.browser.trim().is_empty() {
            return Credentials::Browser {
                browser: cfg.browser.trim().to_string(),
                fallback_file: file,
            };
        }
        match file {
            Some(path) => Credentials::File(path),
            None => Credentials::None,
        }
    }
}

/// Everything the supervisor needs to build a command line, shared by all tasks.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub executable: Executable,
    pub output_dir: PathBuf,
    pub credentials: Credentials,
    /// Careful mode: sleep between requests and cap the rate.
    pub careful: bool,
    pub js_runtime: Option<String>,
}

impl LaunchSettings {
    pub fn new(executable: Executable, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable,
            output_dir: output_dir.into(),
            credentials: Credentials::None,
            careful: false,
            js_runtime: None,
        }
    }

    /// Settings for the configured environment. Probes `PATH` for a JS runtime.
    pub fn from_config(cfg: &YtqConfig, executable: Executable) -> Self {
        Self {
            executable,
            output_dir: cfg.resolved_download_dir(),
            credentials: Credentials::from_config(cfg),
            careful: cfg.safe_mode,
            js_runtime: executable::detect_js_runtime(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn careful(mut self, careful: bool) -> Self {
        self.careful = careful;
        self
    }

    pub fn with_js_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.js_runtime = Some(runtime.into());
        self
    }
}

/// Argument vectors for one admission cycle. Neither includes the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub primary: Vec<OsString>,
    pub fallback: Option<Vec<OsString>>,
}

impl LaunchPlan {
    pub fn build(settings: &LaunchSettings, url: &str) -> Result<Self, LaunchError> {
        match &settings.credentials {
            Credentials::None => Ok(Self {
                primary: arguments(settings, url, &[]),
                fallback: None,
            }),
            Credentials::File(path) => {
                if !path.is_file() {
                    return Err(LaunchError::CookieFileMissing(path.clone()));
                }
                Ok(Self {
                    primary: arguments(settings, url, &cookie_file_flags(path)),
                    fallback: None,
                })
            }
            Credentials::Browser {
                browser,
                fallback_file,
            } => {
                let browser_flags = [
                    OsString::from("--cookies-from-browser"),
                    OsString::from(browser),
                ];
                let fallback = match fallback_file {
                    Some(path) if path.is_file() => {
                        Some(arguments(settings, url, &cookie_file_flags(path)))
                    }
                    Some(path) => {
                        tracing::warn!(
                            "fallback cookie file {} is missing; browser cookies only",
                            path.display()
                        );
                        None
                    }
                    None => None,
                };
                Ok(Self {
                    primary: arguments(settings, url, &browser_flags),
                    fallback,
                })
            }
        }
    }
}

fn cookie_file_flags(path: &Path) -> [OsString; 2] {
    [OsString::from("--cookies"), path.as_os_str().to_os_string()]
}

fn arguments(settings: &LaunchSettings, url: &str, credential_flags: &[OsString]) -> Vec<OsString> {
    let mut args: Vec<OsString> = settings.executable.prefix_args.clone();
    args.push("-o".into());
    args.push(settings.output_dir.join(OUTPUT_TEMPLATE).into_os_string());
    args.push("--newline".into());
    args.push("--progress-template".into());
    args.push(PROGRESS_TEMPLATE.into());
    args.push("-c".into());
    args.push("-f".into());
    args.push(FORMAT_PREFERENCE.into());
    args.extend(credential_flags.iter().cloned());
    if settings.careful {
        args.extend(CAREFUL_FLAGS.iter().map(OsString::from));
    }
    if let Some(runtime) = &settings.js_runtime {
        args.push("--js-runtimes".into());
        args.push(runtime.into());
    }
    if is_playlist_item(url) {
        args.push("--no-playlist".into());
    }
    args.push(url.into());
    args
}

/// A single video addressed inside a playlist (`...&list=...&index=N`).
pub fn is_playlist_item(url: &str) -> bool {
    url.contains("list=") && url.contains("index=")
}

/// Command line for logs, with the cookie file path masked.
pub fn redact(program: &Path, args: &[OsString]) -> String {
    let mut out = program.display().to_string();
    let mut mask_next = false;
    for arg in args {
        out.push(' ');
        if mask_next {
            out.push_str("***");
            mask_next = false;
            continue;
        }
        let text = arg.to_string_lossy();
        mask_next = text == "--cookies";
        out.push_str(&text);
    }
    out
}
