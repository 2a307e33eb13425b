//! nvgo - Go tooling sidecar for Neovim.
//!
//! The editor starts `nvgo` as a job and talks newline-delimited JSON-RPC
//! over its stdin/stdout.

mod router;
mod server;
mod signals;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nvgo_core::{Config, Environment};
use nvgo_delve::Debugger;
use nvgo_util::log::{LogConfig, LogLevel, LogTarget};
use router::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Exit code for a startup misconfiguration.
const EXIT_MISCONFIGURED: i32 = 2;

#[derive(Parser)]
#[command(name = "nvgo")]
#[command(author, version, about = "Go tooling sidecar for Neovim", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LogLevel,

    /// Log file, or `-` for stderr
    #[arg(long)]
    log_file: Option<String>,

    /// JSONC configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve editor requests on stdin/stdout (default)
    Serve,

    /// Print the handler registration manifest
    Specs,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level: {s}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Specs => print_specs(),
        Commands::Serve => {
            let log_file = nvgo_util::log::init(LogConfig {
                level: cli.log_level,
                include_location: matches!(cli.log_level, LogLevel::Trace | LogLevel::Debug),
                target: LogTarget::from_arg(cli.log_file.as_deref()),
            })
            .context("failed to initialize logging")?;
            if let Some(path) = log_file {
                info!(path = %path.display(), "Logging to file");
            }

            let config = match load_config(cli.config.as_deref()).await {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("nvgo: {e:#}");
                    std::process::exit(EXIT_MISCONFIGURED);
                }
            };

            let shutdown = CancellationToken::new();
            let watcher = tokio::spawn(signals::watch(shutdown.clone()));

            info!(version = env!("CARGO_PKG_VERSION"), "Starting nvgo");
            server::serve(
                tokio::io::stdin(),
                tokio::io::stdout(),
                config,
                Environment::from_process(),
                shutdown,
            )
            .await;

            watcher.abort();
            // The blocking stdin reader would keep the runtime from shutting down.
            std::process::exit(0)
        }
    }
}

async fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn print_specs() -> anyhow::Result<()> {
    let registry = Router::registry(&Arc::new(Debugger::new()));
    let specs = Router::specs(&registry);
    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}
