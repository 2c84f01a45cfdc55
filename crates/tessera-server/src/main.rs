#![allow(clippy::doc_markdown)]
//! `Tessera` Server - master daemon of the Tessera metadata control plane.

use anyhow::Context;
use clap::Parser;
use tessera_core::{Master, TesseraConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Tessera master: schema changes, alter jobs and tablet report reconciliation
#[derive(Parser, Debug)]
#[command(name = "tessera-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "tessera.toml", env = "TESSERA_CONFIG")]
    config: String,

    /// Metadata directory holding the edit log, overrides `storage.meta_dir`
    #[arg(short, long, env = "TESSERA_META_DIR")]
    meta_dir: Option<String>,
}

fn init_tracing(config: &TesseraConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let fmt_layer = if config.logging.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TesseraConfig::load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if let Some(meta_dir) = args.meta_dir {
        config.storage.meta_dir = meta_dir;
    }
    config.validate()?;
    init_tracing(&config);

    tracing::info!("Starting Tessera master...");
    tracing::info!("Metadata directory: {}", config.storage.meta_dir);

    let master = Master::open(config)?;
    let mut daemons = master.start()?;
    tracing::info!(daemons = ?daemons.names(), "Tessera master running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    daemons.stop();

    Ok(())
}
