mod cache;
mod classify;
mod commands;
mod config;
mod db;
mod event;
mod form;
mod host;
mod http;
mod lifecycle;
mod logging;
mod outbox;
mod replay;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use cache::SqliteStorage;
use db::{StoreHandle, StoreLocation};
use event::EventHandler;
use host::{Host, LoggingClients, ReqwestNetwork, SqliteRegistrar};
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "hb-sync")]
#[command(about = "Offline shell cache and submission outbox for the Haushaltsbuch web client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hb-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache generation tag, overriding the config file and HB_SYNC_VERSION
  #[arg(long = "cache-version")]
  cache_version: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override version if specified on command line
  let config = if let Some(version) = args.cache_version {
    config::Config { version, ..config }
  } else {
    config
  };

  let _log_guard = logging::init(&config)?;
  let settings = config.settings()?;
  let data_dir = config.data_dir()?;

  let generations = Arc::new(SqliteStorage::open(&data_dir.join("cache.db"))?);
  let store = Arc::new(StoreHandle::new(StoreLocation::File(
    data_dir.join("outbox.db"),
  )));
  let registrar = SqliteRegistrar::new(Arc::clone(&store));

  let host = Host {
    network: Arc::new(ReqwestNetwork::new()?),
    registrar: Arc::new(registrar.clone()),
    clients: Arc::new(LoggingClients),
  };

  let worker = Arc::new(Worker::new(settings.clone(), generations, store, host));
  let ctx = commands::Context {
    settings,
    events: EventHandler::new(Arc::clone(&worker)),
    worker,
    registrar,
  };

  commands::run(args.command, &ctx).await
}
