//! Command-line interface.

mod attempts;
mod escalate;
mod helpers;
mod probe;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "fetchladder")]
#[command(about = "Probe sites for automated access and escalate retrieval strategies")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file and FETCHLADDER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup)
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Probe sites over plain HTTP and a headless browser and write a CSV report
    Probe {
        /// URL list (text, JSON array, or JSON with a business_sites key)
        input: PathBuf,

        /// Maximum sites to probe (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Report path (defaults to a timestamped file in the reports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch reachable sites from a probe report with their recommended method
    Scrape {
        /// Probe report CSV
        report: PathBuf,

        /// Maximum sites to fetch (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Concurrent workers (defaults to the configured value)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run the escalation ladder over sites from a probe report
    Escalate {
        /// Probe report CSV
        report: PathBuf,

        /// Maximum sites to escalate (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Concurrent workers (defaults to the configured value)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Escalate every site, not only those the probe flagged
        #[arg(short, long)]
        all: bool,
    },

    /// Probe sites, fetch the reachable ones, then escalate the rest
    Run {
        /// URL list (text, JSON array, or JSON with a business_sites key)
        input: PathBuf,

        /// Maximum sites to process (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Concurrent workers (defaults to the configured value)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show logged attempts
    Attempts {
        /// Show every run recorded for this URL
        #[arg(long)]
        url: Option<String>,

        /// Number of recent attempts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export the attempt log to CSV
    Export {
        /// Output CSV path
        output: PathBuf,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, _) = load_settings(options)
        .await
        .context("failed to load configuration")?;
    settings
        .ensure_directories()
        .context("failed to create data directories")?;

    match cli.command {
        Commands::Probe {
            input,
            limit,
            output,
        } => {
            let cancel = helpers::cancel_on_ctrl_c();
            probe::cmd_probe(&settings, &input, limit, output, &cancel).await
        }
        Commands::Scrape {
            report,
            limit,
            workers,
        } => {
            let cancel = helpers::cancel_on_ctrl_c();
            escalate::cmd_scrape(&settings, &report, limit, workers, &cancel).await
        }
        Commands::Escalate {
            report,
            limit,
            workers,
            all,
        } => {
            let cancel = helpers::cancel_on_ctrl_c();
            escalate::cmd_escalate(&settings, &report, limit, workers, all, &cancel).await
        }
        Commands::Run {
            input,
            limit,
            workers,
        } => {
            let cancel = helpers::cancel_on_ctrl_c();
            escalate::cmd_run(&settings, &input, limit, workers, &cancel).await
        }
        Commands::Attempts { url, limit } => attempts::cmd_attempts(&settings, url, limit).await,
        Commands::Export { output } => attempts::cmd_export(&settings, &output).await,
    }
}
