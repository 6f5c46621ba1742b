mod cli;
mod commands;
mod output;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tiercache_config::{build_cache, init_tracing, load_settings};
use tiercache_core::CacheContext;

use cli::{Cli, Commands};
use commands::Outcome;
use output::print_error;

/// Exit status of a `get` that found nothing.
const EXIT_MISS: i32 = 2;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(Outcome::Done) => {}
        Ok(Outcome::Miss) => std::process::exit(EXIT_MISS),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<Outcome> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    init_tracing(&settings.logging);

    if matches!(cli.command, Commands::Config) {
        print!("{}", settings.to_toml_string()?);
        return Ok(Outcome::Done);
    }

    let cache = build_cache::<Value>(&settings)?;
    let ctx = CacheContext::new().with_timeout(Duration::from_millis(cli.timeout_ms));
    tracing::debug!(tiers = cache.len(), timeout_ms = cli.timeout_ms, "cache stack ready");

    match &cli.command {
        Commands::Get(args) => commands::cache::get(&cache, &ctx, &args.key).await,
        Commands::Set(args) => {
            commands::cache::set(&cache, &ctx, &args.key, args.value.as_deref()).await
        }
        Commands::Ping => commands::cache::ping(&cache, &ctx).await,
        Commands::Config => Ok(Outcome::Done),
    }
}
