//! gigmarket binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use gig_core::Amount;
use gig_market::MarketConfig;
use tracing_subscriber::EnvFilter;

use gig_cli::cli::{Cli, Commands};
use gig_cli::commands;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => MarketConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => MarketConfig::default(),
    };
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Replay { script, strict } => {
            let mut stderr = io::stderr();
            commands::replay_file(&mut stdout, &mut stderr, cli.format, config, &script, strict)
                .await
                .with_context(|| format!("replaying {}", script.display()))?;
        }
        Commands::Fee { price } => {
            let quote = commands::fee(&config, Amount::new(price))?;
            commands::write_fee(&mut stdout, cli.format, &quote)?;
        }
        Commands::Config { path } => {
            commands::check_config(&mut stdout, cli.format, &path)?;
        }
    }
    Ok(())
}
