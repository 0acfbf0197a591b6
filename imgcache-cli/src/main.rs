use clap::Parser;
use error::AppError;
use imgcache_engine::{CacheConfig, CacheStore};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod commands;
mod error;
mod utils;

use cli::{CliArgs, Command};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("imgcache.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stderr, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let mut cache_config = match args.cache_dir {
        Some(root) => CacheConfig::new(root),
        None => CacheConfig::default(),
    };
    if args.no_backup_tag {
        cache_config = cache_config.with_exclude_from_backup(false);
    }
    info!(root = ?cache_config.root, "Using cache directory");

    let store = CacheStore::new(&cache_config);

    match &args.command {
        Command::Fetch(fetch) => commands::fetch(store, fetch).await,
        Command::Info => commands::info(&store).await,
        Command::Clear => commands::clear(&store).await,
    }
}
