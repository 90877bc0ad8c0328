//! `dropsort classify`: Run the strategy chain on one file.

use dropsort_classifiers::build_orchestrator;
use dropsort_core::classify::Asset;
use dropsort_core::event::EventBus;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: Option<&Path>,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let shutdown = CancellationToken::new();
    super::cancel_on_ctrl_c(shutdown.clone());
    let orchestrator = build_orchestrator(&config, EventBus::new(64), shutdown);

    let result = orchestrator.classify(&Asset::new(path)).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
