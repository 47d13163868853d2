mod cli;
mod codegen;
mod config;
mod error;
mod history;
mod llm;
mod runner;
mod sanitize;
mod settings;
mod store;
mod types;
mod validation;

use anyhow::Result;
use clap::Parser;
use config::AppConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn init_logger(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).try_init()?;
    Ok(())
}

async fn run() -> Result<()> {
    let cli = cli::Cli::parse();

    // Auto-generate config file on first run
    let config_path = AppConfig::config_path()?;
    if !config_path.exists() {
        let path = AppConfig::save_default()?;
        eprintln!("[Config] Created default config: {}", path.display());
    }

    let config = AppConfig::load()?;
    init_logger(&config)?;
    tracing::debug!(
        max_tokens = config.llm.max_tokens,
        timeout_secs = config.llm.request_timeout_secs,
        "config loaded"
    );

    cli::run(cli, &config).await
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
