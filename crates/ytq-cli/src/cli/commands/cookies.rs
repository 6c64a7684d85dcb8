//! `ytq cookies` – show or change where the downloader gets cookies from.

use anyhow::Result;
use std::path::PathBuf;
use ytq_core::config::{self, YtqConfig};

#[derive(Debug, Default)]
pub struct CookieArgs {
    pub path: Option<PathBuf>,
    pub clear: bool,
    pub browser: Option<String>,
    pub no_browser: bool,
}

pub fn run_cookies(cfg: &mut YtqConfig, args: CookieArgs) -> Result<()> {
    let mut changed = false;

    if args.clear {
        cfg.cookies_path = None;
        changed = true;
        println!("Cookie file cleared.");
    } else if let Some(path) = args.path {
        let path = config::expand_home(&path);
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        config::validate_cookie_file(&path)?;
        println!("Using cookie file {}", path.display());
        cfg.cookies_path = Some(path);
        changed = true;
    }

    if let Some(browser) = args.browser {
        let browser = browser.trim().to_string();
        if browser.is_empty() {
            anyhow::bail!("browser name must not be empty");
        }
        println!("Reading cookies from {browser}");
        cfg.use_browser_cookies = true;
        cfg.browser = browser;
        changed = true;
    } else if args.no_browser {
        cfg.use_browser_cookies = false;
        changed = true;
        println!("Browser cookies disabled.");
    }

    if changed {
        cfg.save()?;
    } else {
        print_cookie_source(cfg);
    }
    Ok(())
}

fn print_cookie_source(cfg: &YtqConfig) {
    if cfg.use_browser_cookies {
        println!("Browser: {}", cfg.browser);
    }
    match cfg.resolved_cookies_path() {
        Some(path) => {
            let state = if path.is_file() { "present" } else { "missing" };
            let role = if cfg.use_browser_cookies { " (fallback)" } else { "" };
            println!("Cookie file{role}: {} [{state}]", path.display());
        }
        None if !cfg.use_browser_cookies => println!("No cookies configured."),
        None => {}
    }
}
