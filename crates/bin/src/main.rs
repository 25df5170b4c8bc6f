//! Command line interface for Ordinal.

mod backend;
mod cli;
mod commands;
mod output;

use clap::Parser;
use ordinal::{Board, Config};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, TuningArgs};
use crate::output::OutputFormat;

/// Build the configuration from the optional file plus flag overrides.
fn load_config(args: &TuningArgs) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            Config::from_json_str(&json)?
        }
        None => Config::default(),
    };
    if let Some(default_gap) = args.default_gap {
        config.position.default_gap = default_gap;
    }
    if let Some(min_gap) = args.min_gap {
        config.position.min_gap = min_gap;
    }
    if let Some(max_retries) = args.max_retries {
        config.moves.max_retries = max_retries;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ordinal=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);
    let config = load_config(&cli.tuning)?;

    let backend = backend::create_backend(&cli.backend_config).await?;
    let board = Board::open_with_config(backend, config)?;

    let mutates = matches!(
        cli.command,
        Commands::Add(_) | Commands::Move(_) | Commands::Delete(_) | Commands::Rebalance(_)
    );

    match &cli.command {
        Commands::Add(args) => commands::records::add(&board, args, format).await?,
        Commands::Move(args) => commands::records::move_record(&board, args, format).await?,
        Commands::List(args) => commands::records::list(&board, args, format).await?,
        Commands::Groups => commands::records::groups(&board, format).await?,
        Commands::Delete(args) => commands::records::delete(&board, args, format).await?,
        Commands::Stats(args) => commands::maintenance::stats(&board, args, format).await?,
        Commands::Rebalance(args) => {
            commands::maintenance::rebalance(&board, args, format).await?
        }
        Commands::Report(args) => commands::report::run(&board, args, format).await?,
    }

    if mutates {
        backend::persist(&board, &cli.backend_config).await?;
    }
    Ok(())
}
