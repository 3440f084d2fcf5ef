pub mod bridge;
pub mod commands;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod overlay;
pub mod providers;
pub mod session;
pub mod settings;
pub mod trigger;

use anyhow::Context;
use bridge::{HostBridge, DEFAULT_PORT};
use log::info;
use providers::ProviderRegistry;
use settings::{ExtractionConfiguration, JsonSettingsStore, LogLevel};
use std::path::PathBuf;
use std::sync::Arc;

const SETTINGS_FILE: &str = "bubblener-settings.json";

/// Installs the global logger. `RUST_LOG` overrides the stored level.
pub fn init_logging(level: LogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.into())
        .parse_default_env()
        .try_init();
}

fn settings_path() -> PathBuf {
    std::env::var_os("BUBBLENER_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
}

fn bridge_port() -> anyhow::Result<u16> {
    match std::env::var("BUBBLENER_PORT") {
        Ok(port) => port
            .parse()
            .with_context(|| format!("Invalid BUBBLENER_PORT: {}", port)),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

/// Background host: serves the browser extension until interrupted.
pub async fn run() -> anyhow::Result<()> {
    let path = settings_path();
    let store = Arc::new(JsonSettingsStore::open(&path)?);
    let config = ExtractionConfiguration::load(store.as_ref());
    init_logging(config.log_level);

    info!(
        "Loaded settings from {} (provider: {})",
        path.display(),
        config.provider
    );

    let bridge = HostBridge::new(bridge_port()?, store, Arc::new(ProviderRegistry::new()));
    bridge.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    Ok(())
}
