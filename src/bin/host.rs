//! Headless reminder host.
//!
//! Reads newline-delimited JSON commands from stdin and writes responses,
//! notifications and fallback notices to stdout. All tracing output goes to
//! stderr (and optionally a daily log file) so stdout stays a clean protocol
//! channel.

use beacon::EngineConfig;
use beacon::host::run_stdio_bridge;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn config_path() -> PathBuf {
    std::env::var_os("BEACON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(EngineConfig::default_config_path)
}

fn load_config(path: &std::path::Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    EngineConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))
}

fn init_tracing(config: &EngineConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let (file_layer, guard) = match config.logging.file_directory() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "beacon-host.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = load_config(&path)?;
    let _log_guard = init_tracing(&config);

    tracing::info!(config = %path.display(), "beacon-host starting");

    run_stdio_bridge(config).await.map_err(|e| {
        tracing::error!(error = %e, "beacon-host exited with error");
        anyhow::anyhow!("beacon-host failed: {e}")
    })?;

    tracing::info!("beacon-host shut down cleanly");
    Ok(())
}
