use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sensor_poller::{Config, Console, Poller, StopToken, shutdown};

#[derive(Parser)]
#[command(name = "sensor-poller")]
#[command(about = "Polls DHT22, water-level and DS18B20 sensors once per interval", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the polling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(interval_ms) = cli.interval_ms {
        config.interval_ms = interval_ms;
    }

    let stop = StopToken::new();
    shutdown::install_handler(&stop)?;

    let poller = Poller::start(&config, Console::new(io::stdout())).context("failed to start")?;
    poller.run(&stop, cli.once.then_some(1));
    Ok(())
}
