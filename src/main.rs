//! pl-positions - Main Entry Point
//!
//! Runs the positional analysis from the command line.

use clap::Parser;
use pl_positions::cli::{cmd_cluster, cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pl_positions=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, seed, families, output } => {
            cmd_run(&data, config.as_deref(), seed, families, output.as_deref())?;
        }
        Commands::Cluster { data, linkage } => {
            cmd_cluster(&data, linkage)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
