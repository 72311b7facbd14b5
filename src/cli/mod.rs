//! Command-line surface. Each command prints JSON on stdout.

pub mod scan;
pub mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::RadarConfig;

#[derive(Parser, Debug)]
#[command(name = "steam-radar", version, about = "Scan storefronts for new and upcoming games")]
pub struct Cli {
    /// Fallback log filter when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one scan and print the ranked result
    Scan(scan::ScanArgs),
    /// Print the tag vocabulary for a country
    Tags {
        #[arg(long, default_value = "US")]
        country: String,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List recent scan snapshots
    Snapshots {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum CacheAction {
    /// Delete expired entries
    Purge,
    /// Count total and expired entries
    Stats,
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let cfg = RadarConfig::from_env();
    match cli.command {
        Command::Scan(args) => scan::run(&cfg, args).await,
        Command::Tags { country } => store::tags(&cfg, &country).await,
        Command::Cache { action: CacheAction::Purge } => store::cache_purge(&cfg),
        Command::Cache { action: CacheAction::Stats } => store::cache_stats(&cfg),
        Command::Snapshots { limit } => store::snapshots(&cfg, limit),
    }
}
