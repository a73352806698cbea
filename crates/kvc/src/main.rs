//! kvc - command-line client for kvcache stores
//!
//! Exit codes: 0 success, 1 key not found (`get`), 2 error.

mod commands;

use anyhow::Result;
use clap::Parser;
use kvcache::{CacheStore, StoreConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, Outcome};

/// The requested key does not exist
const EXIT_NOT_FOUND: i32 = 1;

/// The command failed, including when existence could not be determined
const EXIT_ERROR: i32 = 2;

/// Log filter when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory (one .sqlite file per table)
    #[arg(short, long, env = "KVC_DATA_DIR", default_value = kvcache::DEFAULT_DATA_DIR)]
    data: String,

    /// Create tables on first use
    #[arg(long)]
    auto_init: bool,

    /// Disable SQLite WAL journaling
    #[arg(long)]
    no_wal: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    // Logs go to stderr so command output stays clean; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter())
        .init();

    let args = Args::parse();
    let result = execute(args);
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    std::process::exit(exit_code(&result));
}

fn execute(args: Args) -> Result<Outcome> {
    debug!("Data directory: {}", args.data);

    let config = StoreConfig::new(&args.data)
        .with_auto_initialize(args.auto_init)
        .with_wal(!args.no_wal);
    let store = CacheStore::open(config)?;

    let outcome = {
        let mut stdout = std::io::stdout().lock();
        commands::run(&store, args.command, &mut stdout)?
    };
    store.close()?;

    Ok(outcome)
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn exit_code(result: &Result<Outcome>) -> i32 {
    match result {
        Ok(Outcome::Done) => 0,
        Ok(Outcome::NotFound) => EXIT_NOT_FOUND,
        Err(_) => EXIT_ERROR,
    }
}
