use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::init_logging;
use crate::config::AppConfig;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let loaded = AppConfig::load(cli.config.as_deref())?;
    let mut config = loaded.config;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _log_guard = init_logging(&config.logging, cli.debug)?;

    info!("Starting PagePilot v{}", env!("CARGO_PKG_VERSION"));
    match &loaded.path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => warn!("No configuration file found, using defaults"),
    }
    let ctx = CliContext::new(config, loaded.path, cli.output);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
