use anyhow::Result;
use clap::Parser;
use steam_radar::cli::{dispatch, Cli};
use steam_radar::{telemetry, util::env as env_util};

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log)?;
    dispatch(cli).await
}
