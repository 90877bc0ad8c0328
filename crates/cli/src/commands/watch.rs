//! `dropsort watch`: Long-running folder watcher.

use dropsort_config::AppConfig;
use dropsort_core::event::EventBus;
use dropsort_pipeline::Pipeline;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    print_banner(&config);

    let shutdown = CancellationToken::new();
    let events = EventBus::new(1024);
    let telemetry = super::start_telemetry(&config, &events, shutdown.child_token());

    let pipeline = Arc::new(Pipeline::from_config(config, events, shutdown.clone()));
    super::cancel_on_ctrl_c(shutdown.clone());

    info!("Watcher starting");
    let stats = pipeline.watch().await?;

    shutdown.cancel();
    if let Some(handle) = telemetry {
        let _ = handle.await;
    }

    println!("\n  {stats}");
    Ok(())
}

fn print_banner(config: &AppConfig) {
    let strategies = config.enabled_strategies();
    println!("📥 dropsort — watching for split downloads");
    println!("   Downloads:  {}", config.watch.downloads_dir.display());
    println!("   Extract to: {}", config.extraction_dir().display());
    match &config.routing.project_dir {
        Some(dir) => println!("   Project:    {}", dir.display()),
        None => println!("   Project:    (none, assets stay where extracted)"),
    }
    println!(
        "   Strategies: {}",
        if strategies.is_empty() {
            "heuristic only".to_string()
        } else {
            format!("{} → heuristic", strategies.join(" → "))
        }
    );
    println!("   Press Ctrl-C to stop\n");
}
