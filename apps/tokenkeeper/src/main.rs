#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod config;
mod logging;
mod signals;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokenkeeper_auth::{SchedulerExit, TokenKeeper};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Keeps an OAuth2 bearer token fresh and publishes it to a file
#[derive(Parser)]
#[command(name = "tokenkeeper")]
#[command(about = "Keeps an OAuth2 bearer token fresh and publishes it to a file")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (JSON, secrets redacted) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and keep the token file fresh until stopped
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose)?;

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check => check(&config),
    }
}

fn check(config: &AppConfig) -> Result<()> {
    tracing::info!("checking configuration");
    config
        .keeper
        .validate()
        .context("invalid keeper configuration")?;
    println!("Configuration is valid");
    println!("{}", config.to_json()?);
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tokenkeeper starting");

    let keeper = TokenKeeper::from_config(&config.keeper).context("invalid keeper configuration")?;
    let cancel = CancellationToken::new();
    let mut handle = keeper
        .start(cancel.child_token())
        .await
        .context("initial authentication failed")?;

    // `None` means a shutdown signal arrived while the scheduler was healthy.
    let finished = tokio::select! {
        exit = handle.wait() => Some(exit),
        signal = signals::wait_for_shutdown() => {
            let signal = signal?;
            tracing::info!(signal, "shutdown requested, cancelling token refresh");
            None
        }
    };
    let exit = match finished {
        Some(exit) => exit,
        None => {
            cancel.cancel();
            handle.stop().await
        }
    };

    match exit {
        SchedulerExit::Cancelled => {
            tracing::info!("tokenkeeper stopped");
            Ok(())
        }
        SchedulerExit::Failed(e) => {
            Err(anyhow::Error::new(e).context("token refresh stopped"))
        }
        SchedulerExit::Aborted(reason) => {
            anyhow::bail!("token refresh task aborted: {reason}")
        }
    }
}
