//! CLI for the ytq download queue.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ytq_core::config;

use commands::{
    run_add, run_cookies, run_queue, run_show_config, run_status, run_task_command, CookieArgs,
    QueueArgs, TaskAction,
};

/// Top-level CLI for ytq.
#[derive(Debug, Parser)]
#[command(name = "ytq")]
#[command(about = "ytq: bounded yt-dlp download queue with pause, resume and cancel", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the queue: download the given URLs and accept commands on the control socket.
    Run {
        /// Video URLs to queue at startup.
        urls: Vec<String>,
        /// Run up to N downloads at once (default: max_concurrent from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Write downloads here instead of the configured directory.
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
        /// Keep running when the queue is empty (add more with `ytq add`).
        #[arg(long)]
        stay: bool,
    },

    /// Queue a URL in the running `ytq run`.
    Add {
        /// Video URL.
        url: String,
    },

    /// Pause a downloading task by its ID.
    Pause {
        /// Task identifier.
        id: u64,
    },

    /// Resume a paused task by its ID.
    Resume {
        /// Task identifier.
        id: u64,
    },

    /// Cancel a queued, downloading or paused task by its ID.
    Cancel {
        /// Task identifier.
        id: u64,
    },

    /// Requeue a completed, failed or cancelled task by its ID.
    Retry {
        /// Task identifier.
        id: u64,
    },

    /// Show all tasks of the running `ytq run`.
    Status {
        /// Print the raw JSON snapshot list.
        #[arg(long)]
        json: bool,
    },

    /// Show or set the cookie source.
    Cookies {
        /// Netscape-format cookie file to use.
        path: Option<PathBuf>,
        /// Forget the configured cookie file.
        #[arg(long, conflicts_with = "path")]
        clear: bool,
        /// Read cookies from this browser; the cookie file becomes the fallback.
        #[arg(long, value_name = "NAME", conflicts_with = "no_browser")]
        browser: Option<String>,
        /// Stop reading cookies from a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Print the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                urls,
                jobs,
                download_dir,
                stay,
            } => {
                let args = QueueArgs {
                    urls,
                    jobs,
                    download_dir,
                    stay,
                };
                run_queue(&cfg, args).await?;
            }
            CliCommand::Add { url } => run_add(&url).await?,
            CliCommand::Pause { id } => run_task_command(TaskAction::Pause, id).await?,
            CliCommand::Resume { id } => run_task_command(TaskAction::Resume, id).await?,
            CliCommand::Cancel { id } => run_task_command(TaskAction::Cancel, id).await?,
            CliCommand::Retry { id } => run_task_command(TaskAction::Retry, id).await?,
            CliCommand::Status { json } => run_status(json).await?,
            CliCommand::Cookies {
                path,
                clear,
                browser,
                no_browser,
            } => {
                let args = CookieArgs {
                    path,
                    clear,
                    browser,
                    no_browser,
                };
                run_cookies(&mut cfg, args)?;
            }
            CliCommand::Config => run_show_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
