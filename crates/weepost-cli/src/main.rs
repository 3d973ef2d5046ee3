//! weepost - post live weather samples to an HTTP endpoint
//!
//! Reads loop samples as JSON lines and hands them to the delivery
//! worker, which projects each one through the configured filters and
//! POSTs the result.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use weepost_core::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "weepost")]
#[command(about = "Post live weather samples to an HTTP endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./weepost.toml or ~/.config/weepost/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Read samples (JSON lines) and post them until EOF or a signal
    Run(cmd::run::RunArgs),
    /// Validate configuration and compile filters, optionally projecting one sample
    Check(cmd::check::CheckArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    weepost_core::init_logging(cli.quiet, cli.debug);

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Command::Run(args) => cmd::run::run(args, config),
        Command::Check(args) => cmd::check::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            cmd::show_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    };

    result.unwrap_or_else(|e| {
        log::error!("{e:#}");
        ExitCode::from(2)
    })
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}
