use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hostwarden::{
    config::read_config_file,
    orchestrator::{Components, Orchestrator},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Log everything the engine does
    #[arg(long)]
    verbose: bool,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_targets(vec![("hostwarden", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn log_level(configured: Option<&str>, verbose: bool) -> LevelFilter {
    if verbose {
        return LevelFilter::TRACE;
    }
    configured
        .and_then(|level| LevelFilter::from_str(level).ok())
        .unwrap_or(LevelFilter::DEBUG)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = read_config_file(&args.file)?;
    init(log_level(config.log_level.as_deref(), args.verbose));
    trace!("started with args: {args:?}");

    config.apply_env();
    config.validate().context("invalid configuration")?;

    let components = Components::from_config(&config).await?;
    components.warm_up(Utc::now()).await;

    let orchestrator = Orchestrator::start(&config, components);
    info!("hostwarden running, press ctrl-c to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {e}");
    }

    orchestrator.shutdown().await
}
