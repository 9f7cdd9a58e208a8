use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connpool_cli::config::DEFAULT_CONFIG_PATH;
use connpool_cli::{logging, run, AppConfig, RunOptions};

/// Connection pool driver
///
/// Runs a batch of simulated database clients against a bounded pool.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[clap(long, global = true, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured client and print a summary
    Run {
        /// Path to the configuration file
        #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Seconds to wait for all clients before reporting
        #[clap(long, default_value_t = 30)]
        deadline_secs: u64,
    },

    /// Validate a configuration file and print it as JSON
    Check {
        /// Path to the configuration file
        #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    match cli.command {
        Commands::Run {
            config,
            deadline_secs,
        } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("cannot start with {}", config.display()))?;
            let options = RunOptions {
                deadline: Duration::from_secs(deadline_secs),
                ..Default::default()
            };

            let report = run(&config, &options)?;
            println!("{}", report);
        }
        Commands::Check { config } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("invalid configuration {}", config.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
