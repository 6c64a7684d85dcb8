//! Classify downloader output lines into progress, fatal conditions and
//! browser-cookie failures.
//!
//! Classification is pure; the supervisor decides what to do with the result.
//! Checks run in priority order and a line yields at most one event.

use std::path::Path;

/// Prefix of the lines produced by our `--progress-template`.
pub const PROGRESS_PREFIX: &str = "download:";

const DESTINATION_PREFIX: &str = "[download] Destination:";

/// Browsers the downloader can read cookies from.
const BROWSER_NAMES: &[&str] = &[
    "chrome", "chromium", "firefox", "edge", "brave", "opera", "safari", "vivaldi", "whale",
];

/// Causes that make browser-derived cookies unusable on this host.
const BROWSER_FAILURE_CAUSES: &[&str] = &[
    "decrypt",
    "database is locked",
    "could not find",
    "profile",
    "no such file",
    "keychain",
];

/// One parsed progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percent complete in [0.0, 100.0]; 0.0 when the downloader reports NA.
    pub percent: f64,
    pub speed: String,
    pub eta: String,
}

/// Output patterns that end a run immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    CookiesExpired,
    LoginRequired,
    JsRuntimeMissing,
    FormatUnavailable,
}

impl FatalKind {
    /// Message shown to the operator on the failed task.
    pub fn message(self) -> &'static str {
        match self {
            FatalKind::CookiesExpired => "cookies are no longer valid; re-import the cookie file",
            FatalKind::LoginRequired => {
                "login verification required; re-import cookies or enable browser cookies"
            }
            FatalKind::JsRuntimeMissing => {
                "no JavaScript runtime available; install Node.js and retry"
            }
            FatalKind::FormatUnavailable => {
                "no downloadable format available; check the cookies or try another video"
            }
        }
    }

    fn detect(line: &str) -> Option<Self> {
        if line.contains("cookies are no longer valid") {
            return Some(FatalKind::CookiesExpired);
        }
        if line.contains("Sign in to confirm you") {
            return Some(FatalKind::LoginRequired);
        }
        if line.contains("No supported JavaScript runtime could be found")
            || line.contains("n challenge solving failed")
        {
            return Some(FatalKind::JsRuntimeMissing);
        }
        if line.contains("Requested format is not available") {
            return Some(FatalKind::FormatUnavailable);
        }
        None
    }
}

/// What a single output line means to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Browser cookies cannot be used; switch to the cookie file.
    BrowserCookieFailure,
    Fatal(FatalKind),
    Progress(ProgressUpdate),
    /// Title derived from the destination file name.
    Destination(String),
    Other,
}

/// Classify one trimmed line. `fallback_armed` is true only while a cookie-file
/// fallback is still available for this run.
pub fn classify_line(line: &str, fallback_armed: bool) -> LineEvent {
    if fallback_armed && is_browser_cookie_failure(line) {
        return LineEvent::BrowserCookieFailure;
    }
    if let Some(kind) = FatalKind::detect(line) {
        return LineEvent::Fatal(kind);
    }
    if line.starts_with(PROGRESS_PREFIX) {
        return match parse_progress(line) {
            Some(update) => LineEvent::Progress(update),
            None => LineEvent::Other,
        };
    }
    if let Some(title) = parse_destination(line) {
        return LineEvent::Destination(title);
    }
    LineEvent::Other
}

/// An error line about reading cookies from a browser, with a known cause.
pub fn is_browser_cookie_failure(line: &str) -> bool {
    if !line.contains("ERROR") {
        return false;
    }
    let lower = line.to_ascii_lowercase();
    let mentions_browser_cookies = lower.contains("cookies-from-browser")
        || (lower.contains("cookie")
            && (lower.contains("browser") || BROWSER_NAMES.iter().any(|b| lower.contains(b))));
    mentions_browser_cookies && BROWSER_FAILURE_CAUSES.iter().any(|c| lower.contains(c))
}

/// Parse `download:<percent> <speed> <eta>`.
///
/// Percent is the first field and ETA the last; everything in between is the
/// speed, which may contain a space ("Unknown B/s"). Malformed lines give `None`.
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    let rest = line.strip_prefix(PROGRESS_PREFIX)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let percent = match fields[0].trim_end_matches('%') {
        "NA" | "N/A" => 0.0,
        raw => raw.parse::<f64>().ok().filter(|p| p.is_finite())?,
    };
    let eta = fields[fields.len() - 1];
    let speed = fields[1..fields.len() - 1].join(" ");
    Some(ProgressUpdate {
        percent: percent.clamp(0.0, 100.0),
        speed,
        eta: eta.to_string(),
    })
}

/// `[download] Destination: /dir/Title.f137.mp4` gives `Title`.
fn parse_destination(line: &str) -> Option<String> {
    let path = line.strip_prefix(DESTINATION_PREFIX)?.trim();
    let stem = Path::new(path).file_stem()?.to_string_lossy().into_owned();
    let title = strip_format_suffix(&stem);
    (!title.is_empty()).then(|| title.to_string())
}

/// Separate audio/video streams are written as `Title.f<format id>.<ext>`.
fn strip_format_suffix(stem: &str) -> &str {
    match stem.rsplit_once(".f") {
        Some((base, id)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => stem,
    }
}
