use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use partywave_core::{Config, Runtime};
use partywave_impls::RedisStore;

use crate::commands::Command;

mod commands;
mod logging;

/// Inspect and operate the live state of listening rooms
#[derive(Parser, Debug)]
#[command(name = "partywave")]
#[command(version)]
struct Args {
    /// The runtime store to operate on
    #[arg(long, env = "PARTYWAVE_REDIS_URL", default_value = "redis://127.0.0.1/")]
    redis_url: String,

    /// Log debug messages of partywave crates
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logger(args.verbose).context("Could not initialize logging")?;

    let config = Config::from_env();
    debug!("Using key prefix {:?}", config.key_prefix);

    let store = RedisStore::connect(&args.redis_url)
        .await
        .with_context(|| format!("Could not connect to {}", args.redis_url))?;

    let runtime = Runtime::new(store, config);

    commands::run(&runtime, args.command).await
}
