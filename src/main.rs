//! Vocalmaster CLI
//!
//! Command-line interface for the vocal mastering chain.

use clap::Parser;
use env_logger::Env;
use log::info;

use vocalmaster::cli::commands;
use vocalmaster::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Vocalmaster v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Master {
            input,
            output,
            preset,
            params,
            format,
        } => commands::master(&input, &output, preset, params.as_deref(), format).map(|_| ()),
        Commands::Batch {
            input_dir,
            output_dir,
            preset,
            params,
            format,
        } => commands::batch(&input_dir, &output_dir, preset, params.as_deref(), format)
            .map(|_| ()),
        Commands::Presets { name } => commands::presets(name),
        Commands::Analyze { path } => commands::analyze(&path),
    }
}
