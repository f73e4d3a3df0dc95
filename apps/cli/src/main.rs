mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::Layer;

use cli::{Cli, Commands, LogFormat};
use commands::*;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let cfg = match &cli.config {
        Some(path) => iox::Config::load(path)?,
        None => iox::Config::default(),
    };
    debug!(?cfg, "configuration");

    let result = match &cli.command {
        Commands::MakeTrack(args) => run_make_track(args, &cfg),
        Commands::Annotate(args) => run_annotate(args, &cfg),
        Commands::Laps(args) => run_laps(args, &cfg),
        Commands::Align(args) => run_align(args, &cfg),
    };
    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}

fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else {
        let default_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    // logs go to stderr; stdout carries command output
    let fmt_layer = match cli.log_format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    Ok(())
}
