//! `ytq config` – print the effective configuration.

use anyhow::Result;
use ytq_core::config::{self, YtqConfig};
use ytq_core::executable;

pub fn run_show_config(cfg: &YtqConfig) -> Result<()> {
    if let Ok(path) = config::config_path() {
        println!("# {}", path.display());
    }
    print!("{}", cfg.to_toml()?);
    println!();
    println!(
        "# downloader: {}",
        executable::locate_downloader(cfg.executable.as_deref()).display()
    );
    match executable::detect_js_runtime() {
        Some(runtime) => println!("# js runtime: {runtime}"),
        None => println!("# js runtime: none found"),
    }
    Ok(())
}
