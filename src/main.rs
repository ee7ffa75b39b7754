use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use simplecache::{logging, Config, SimpleCache, DEFAULT_CACHE_DAYS};

#[derive(Parser, Debug)]
#[command(name = "simplecache")]
#[command(about = "Inspect and maintain a simplecache store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/simplecache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show where the store lives and how many rows it holds
  Stats,
  /// Print a cached value as JSON
  Get {
    endpoint: String,
    #[arg(long, default_value = "")]
    checksum: String,
  },
  /// Store a JSON value
  Set {
    endpoint: String,
    /// Value as JSON
    data: String,
    #[arg(long, default_value = "")]
    checksum: String,
    #[arg(long, default_value_t = DEFAULT_CACHE_DAYS)]
    days: u32,
  },
  /// Delete expired rows and compact the store
  Cleanup {
    /// Delete every row, expired or not
    #[arg(long)]
    force: bool,
  },
  /// Delete everything
  Purge,
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let cache = SimpleCache::from_config(&config)?;

  match args.command {
    Command::Stats => {
      let now = chrono::Utc::now().timestamp();
      let stats = cache
        .store()
        .stats(now)
        .ok_or_else(|| eyre!("Could not read {}", cache.store_path().display()))?;
      println!("store:   {}", cache.store_path().display());
      println!("entries: {}", stats.total);
      println!("expired: {}", stats.expired);
    }
    Command::Get { endpoint, checksum } => {
      match cache.get::<serde_json::Value>(&endpoint, &checksum) {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => return Err(eyre!("No cached value for {}", endpoint)),
      }
    }
    Command::Set {
      endpoint,
      data,
      checksum,
      days,
    } => {
      let value: serde_json::Value =
        serde_json::from_str(&data).map_err(|e| eyre!("Value is not valid JSON: {}", e))?;
      cache.set(&endpoint, &value, &checksum, days);
    }
    Command::Cleanup { force } => match cache.cleanup(force) {
      Some(removed) => println!("removed {} rows", removed),
      None => println!("cleanup skipped"),
    },
    Command::Purge => match cache.purge_all() {
      Some(_) => println!("cache purged"),
      None => println!("purge skipped"),
    },
  }

  cache.close();
  Ok(())
}
