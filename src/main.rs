//! celex-harvest: incremental harvester for EU court-case texts

mod commands;

use anyhow::Result;
use celex_harvest::config::{Config, LoggingConfig, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use commands::{init_config, list_pending, run_harvest, show_status, RunOverrides};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "celex-harvest")]
#[command(about = "Incrementally harvest EU court-case texts into a remote dataset")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new cases, resolve their text and publish them in batches
    Run {
        /// Maximum documents to process in this run
        #[arg(long)]
        max_docs: Option<usize>,

        /// Documents per published batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Checkpoint file path
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Resolve content but publish nothing and leave the checkpoint untouched
        #[arg(long)]
        dry_run: bool,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// List identifiers the next run would process
    Discover {
        /// Treat every discovered identifier as new
        #[arg(long)]
        ignore_checkpoint: bool,
    },

    /// Show checkpoint statistics
    Status,

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Load configuration and install logging for commands that need both
fn setup(cli_config: &Path, verbose: u8) -> Result<Config> {
    let config = Config::load_or_default(cli_config)?;
    config.logging.install(verbose)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            max_docs,
            batch_size,
            checkpoint,
            dry_run,
            quiet,
        } => {
            let config = setup(&cli.config, cli.verbose)?;
            let overrides = RunOverrides {
                max_docs,
                batch_size,
                checkpoint,
                dry_run,
                quiet,
            };
            run_harvest(config, overrides).await
        }
        Commands::Discover { ignore_checkpoint } => {
            let config = setup(&cli.config, cli.verbose)?;
            list_pending(config, ignore_checkpoint).await
        }
        Commands::Status => {
            let config = setup(&cli.config, cli.verbose)?;
            show_status(config).await
        }
        Commands::Init { path, force } => {
            LoggingConfig::default().install(cli.verbose)?;
            init_config(path, force).await
        }
    }
}
