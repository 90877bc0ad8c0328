//! `dropsort ingest`: Process fragment files given on the command line.

use chrono::Utc;
use dropsort_core::event::EventBus;
use dropsort_pipeline::Pipeline;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: Option<&Path>,
    paths: Vec<PathBuf>,
    origin: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let shutdown = CancellationToken::new();
    let events = EventBus::new(1024);
    let telemetry = super::start_telemetry(&config, &events, shutdown.child_token());
    let pipeline = Pipeline::from_config(config, events, shutdown.clone());
    super::cancel_on_ctrl_c(shutdown.clone());

    for path in &paths {
        match pipeline.ingest_path(path) {
            Some((descriptor, status)) => {
                if let Some(origin) = &origin {
                    pipeline.annotate_origin(&descriptor.group_key, origin);
                }
                println!(
                    "  {} part {}/{}: {status}",
                    descriptor.group_key, descriptor.part_number, descriptor.declared_total_parts
                );
            }
            None => println!("  ⚠️  {} is not a fragment, skipped", path.display()),
        }
    }

    let processed = pipeline.drain_at(Utc::now()).await;
    for item in &processed {
        let destination = item
            .destination
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(not routed)".into());
        println!(
            "  {} → {} [{} via {}] {}",
            item.asset.file_name(),
            item.result.asset_type,
            item.result.confidence,
            item.result.method,
            destination
        );
    }

    for snapshot in pipeline.registry().snapshot() {
        println!(
            "  ⏳ {}: {}/{} parts, waiting for {:?}",
            snapshot.group_key,
            snapshot.received_parts.len(),
            snapshot.expected_parts,
            missing(&snapshot.received_parts, snapshot.expected_parts)
        );
    }

    shutdown.cancel();
    if let Some(handle) = telemetry {
        let _ = handle.await;
    }

    println!("\n  {}", pipeline.stats());
    Ok(())
}

/// Part numbers in `1..=expected` not in `received`.
pub(crate) fn missing(received: &[u32], expected: u32) -> Vec<u32> {
    (1..=expected).filter(|n| !received.contains(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_missing_parts() {
        assert_eq!(missing(&[1, 3], 4), vec![2, 4]);
        assert!(missing(&[1, 2], 2).is_empty());
    }
}
