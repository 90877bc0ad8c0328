pub mod classify;
pub mod config_cmd;
pub mod doctor;
pub mod ingest;
pub mod onboard;
pub mod parse;
pub mod status;
pub mod watch;

use dropsort_config::{AppConfig, ConfigError};
use dropsort_core::event::EventBus;
use dropsort_telemetry::build_emitter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

/// The config file a command reads.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

/// Attach the analytics emitter to `events` when telemetry is enabled.
pub fn start_telemetry(
    config: &AppConfig,
    events: &EventBus,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let emitter = build_emitter(&config.telemetry, env!("CARGO_PKG_VERSION"))?;
    tracing::debug!(sinks = ?emitter.sink_names(), "Telemetry enabled");
    Some(Arc::new(emitter).start(events, cancel))
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            token.cancel();
        }
    });
}
