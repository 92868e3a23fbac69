// SPDX-License-Identifier: AGPL-3.0-or-later
//! fsbridge CLI
//!
//! Serve a directory through the bridge, or inspect what the bridge would
//! report for it.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fsb")]
#[command(author, version, about = "fsbridge - serve storage backends through FUSE", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a directory through the bridge
    Mount {
        /// Directory to serve
        source: PathBuf,

        /// Where to mount it
        mountpoint: PathBuf,

        /// Mount options file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Present every file as owned by whoever accesses it
        #[arg(long)]
        mirror_owner: bool,

        /// Mount read-only
        #[arg(long)]
        read_only: bool,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },

    /// Show the attributes the bridge reports for a path
    Stat {
        /// Directory serving as the backend root
        source: PathBuf,

        /// Path inside the backend
        #[arg(default_value = ".")]
        path: String,
    },

    /// List a directory as the bridge reports it
    #[command(alias = "dir")]
    Ls {
        /// Directory serving as the backend root
        source: PathBuf,

        /// Path inside the backend
        #[arg(default_value = ".")]
        path: String,

        /// Long format with details
        #[arg(short, long)]
        long: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Mount { source, mountpoint, config, mirror_owner, read_only, allow_other } => {
            let overrides = commands::MountOverrides { mirror_owner, read_only, allow_other };
            commands::mount(&source, &mountpoint, config.as_deref(), overrides).await
        }
        Commands::Stat { source, path } => commands::stat(&source, &path).await,
        Commands::Ls { source, path, long, human } => commands::ls(&source, &path, long, human).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
