#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod output;
mod prompt;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use webpub_mount::{MountError, PublishError, identity};

use crate::commands::{clean, completions, list, publish};

/// Publish a local directory through the web server until interrupted
#[derive(Parser)]
#[command(name = "webpub")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Publish ~/site as http://localhost/site until Ctrl+C
    sudo webpub publish ~/site

    # Publish under a different name and open it in the browser
    sudo webpub publish ~/build/html docs --open

    # Show what is currently published
    webpub list

    # Tear down a publish whose terminal was closed
    sudo webpub clean docs
")]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to the first of ~/.config/webpub/config.toml, /etc/webpub/config.toml)
    #[arg(long, value_name = "FILE", env = "WEBPUB_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a directory until interrupted
    Publish(publish::Args),

    /// Tear down a publish left behind by a vanished session
    Clean(clean::Args),

    /// List recorded publishes and mounts under the document root
    List(list::Args),

    /// Generate shell completions
    Completions(completions::Args),

    /// Print the version
    Version,
}

/// Keeps the file writer flushing until exit
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const LOG_FILE: &str = "webpub.log";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            // Parsed separately: the error may predate argument parsing
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions(args) => return completions::execute(args),
        Commands::Version => {
            println!("{}", version_line());
            return Ok(());
        }
        _ => {}
    }

    if matches!(cli.command, Commands::Publish(_) | Commands::Clean(_)) {
        identity::ensure_privileged()?;
    }

    let config = config::load(cli.config.as_deref())?;
    setup_tracing(cli.verbose, cli.quiet, config.log_dir.as_deref())?;

    match cli.command {
        Commands::Publish(args) => publish::execute(&args, config, cli.quiet),
        Commands::Clean(args) => clean::execute(&args, config),
        Commands::List(args) => list::execute(&args, &config),
        Commands::Completions(args) => completions::execute(&args),
        Commands::Version => {
            println!("{}", version_line());
            Ok(())
        }
    }
}

fn version_line() -> String {
    format!("webpub {}", env!("CARGO_PKG_VERSION"))
}

fn level_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into())
}

/// Set up tracing on stderr (unless quiet) and, with a log directory, a
/// daily-rotated file that is written even when quiet.
fn setup_tracing(verbose: u8, quiet: bool, log_dir: Option<&Path>) -> Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let stderr_layer = (!quiet).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_filter(level_filter(verbose))
    });

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.get_or_init(|| guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(level_filter(verbose.max(1))),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Map an error to an exit code by walking its chain for typed errors.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<PublishError>() {
            return if err.is_usage() {
                exit_code::USAGE_ERROR
            } else {
                exit_code::GENERAL_ERROR
            };
        }
        if cause.downcast_ref::<MountError>().is_some() {
            return exit_code::GENERAL_ERROR;
        }
    }
    exit_code::GENERAL_ERROR
}
