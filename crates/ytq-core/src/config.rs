use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// First line of a Netscape-format cookie jar, as exported by browser extensions.
pub const NETSCAPE_COOKIE_HEADER: &str = "# Netscape HTTP Cookie File";

/// Global configuration loaded from `~/.config/ytq/config.toml`.
///
/// Missing keys fall back to their defaults so older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtqConfig {
    /// Directory downloads are written to. A leading `~` is expanded.
    pub download_dir: PathBuf,
    /// Optional Netscape cookie file passed to the downloader.
    pub cookies_path: Option<PathBuf>,
    /// Derive cookies from an installed browser; `cookies_path` then becomes the fallback.
    pub use_browser_cookies: bool,
    /// Browser to read cookies from when `use_browser_cookies` is set.
    pub browser: String,
    /// Careful mode: sleep between requests and cap the transfer rate.
    pub safe_mode: bool,
    /// Maximum number of downloader processes running at once.
    pub max_concurrent: usize,
    /// Explicit downloader executable; discovered automatically when unset.
    pub executable: Option<PathBuf>,
}

impl Default for YtqConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            cookies_path: None,
            use_browser_cookies: false,
            browser: "chrome".to_string(),
            safe_mode: true,
            max_concurrent: 5,
            executable: None,
        }
    }
}

impl YtqConfig {
    /// Download directory with `~` expanded.
    pub fn resolved_download_dir(&self) -> PathBuf {
        expand_home(&self.download_dir)
    }

    /// Cookie file with `~` expanded; an empty path counts as unset.
    pub fn resolved_cookies_path(&self) -> Option<PathBuf> {
        self.cookies_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(expand_home)
    }

    /// Concurrency ceiling, never below one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Persist to the default config path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("write config {}", path.display()))?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ytq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<YtqConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<YtqConfig> {
    if !path.exists() {
        let default_cfg = YtqConfig::default();
        default_cfg.save_to(path)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: YtqConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Check that `path` exists and looks like a Netscape cookie jar.
pub fn validate_cookie_file(path: &Path) -> Result<()> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("open cookie file {}", path.display()))?;
    let mut head = [0u8; 100];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let head = String::from_utf8_lossy(&head[..filled]);
    if !head.contains(NETSCAPE_COOKIE_HEADER) {
        anyhow::bail!(
            "{} is not a Netscape-format cookie file (missing \"{}\")",
            path.display(),
            NETSCAPE_COOKIE_HEADER
        );
    }
    Ok(())
}

pub fn validate_download_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("download directory {} does not exist", path.display());
    }
    Ok(())
}

/// Expand a leading `~` against `$HOME`; other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("~/Downloads")
}
