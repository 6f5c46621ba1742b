use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tiercache")]
#[command(about = "Inspect and exercise a configured tiercache stack")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./tiercache.toml when present)
    #[arg(short, long, global = true, env = "TIERCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deadline for the whole operation, in milliseconds
    #[arg(short, long, global = true, default_value_t = 5000)]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a key through every tier
    Get(GetArgs),
    /// Write a JSON value to every tier
    Set(SetArgs),
    /// Check that every tier is reachable
    Ping,
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Cache key
    pub key: String,
}

#[derive(clap::Args)]
pub struct SetArgs {
    /// Cache key
    pub key: String,
    /// JSON value (reads stdin if omitted)
    pub value: Option<String>,
}
