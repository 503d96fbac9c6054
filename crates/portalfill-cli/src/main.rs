mod cli;
mod commands;
mod completions;
mod config;
mod error;
mod output;
mod paths;
mod setup;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PORTALFILL_LOG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return;
    }

    let config = config::CliConfig::load();

    // Logs go to a file; stdout carries command output and the stdio protocol.
    let _guard = match init_logging(cli.verbose) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: file logging disabled: {err:#}");
            None
        }
    };

    if let Err(err) = run(cli, config).await {
        error::handle_error(err);
    }
}

fn init_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = paths::logs_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "portalfill.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    Ok(guard)
}

async fn run(cli: Cli, config: config::CliConfig) -> Result<()> {
    let session = setup::build_session(&cli, &config)?;
    let profile = setup::profile(&cli, &config);
    let profile = profile.as_deref();
    let format = cli.format;

    match cli.command {
        Commands::Probe => commands::probe::run(&session, format).await,
        Commands::Open => commands::open::run(&session, profile, format).await,
        Commands::Diagnose(args) => {
            commands::diagnose::run(&session, profile, args, format).await
        }
        Commands::Fill(args) => commands::fill::run(&session, profile, args, format).await,
        Commands::Collect(args) => {
            commands::collect::run(&session, profile, args, format).await
        }
        Commands::Stdio => commands::stdio::run(session, profile.map(str::to_string)).await,
        Commands::Completions { .. } => Ok(()),
    }
}
