//! swcache - command line host for the offline cache manager.
//!
//! Drives the worker lifecycle against a real origin with the cache
//! stores persisted on disk, so the same stores survive between runs the
//! way a browser's do.

mod commands;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swcache_core::{Config, Fetcher, HttpFetcher};

use commands::{ClearArgs, FetchArgs};

/// Log file written inside the cache directory
const LOG_FILE: &str = "swcache.log";

/// Offline cache manager for a PWA origin
#[derive(Parser)]
#[command(name = "swcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Origin to front, overriding the config file
    #[arg(long, global = true)]
    origin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pre-cache the manifest into a new store generation
    Install,

    /// Install, then activate and reclaim stores of older generations
    Activate,

    /// Send one request through the worker
    Fetch(FetchArgs),

    /// List stores and their entries
    Status,

    /// Delete cache stores
    Clear(ClearArgs),
}

/// Initialize the tracing subscriber for logging.
/// Returns the guard that flushes the log file on drop.
fn init_tracing(verbose: bool, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // RUST_LOG wins over --verbose
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let network: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
    let mut out = io::stdout();
    match command {
        Commands::Install => commands::install(config, network, &mut out).await,
        Commands::Activate => commands::activate(config, network, &mut out).await,
        Commands::Fetch(args) => commands::fetch(config, args, network, &mut out).await,
        Commands::Status => commands::status(config, &mut out).await,
        Commands::Clear(args) => commands::clear(config, args, &mut out).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }

    let log_dir = config.cache_dir().ok();
    let guard = init_tracing(cli.verbose, log_dir.as_ref());
    info!(origin = %config.origin, version = %config.cache_version, "swcache starting");

    let result = run(cli.command, &config).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        // Flush the log file before exiting
        drop(guard);
        std::process::exit(1);
    }
    Ok(())
}
