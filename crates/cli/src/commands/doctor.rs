//! `dropsort doctor`: Diagnose system health.

use dropsort_classifiers::build_orchestrator;
use dropsort_core::event::EventBus;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 dropsort Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let file = super::config_file(config_path);
    if !file.exists() {
        println!("  ⚠️  No config file at {}, using defaults (run `dropsort onboard`)", file.display());
        issues += 1;
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  {} issue(s) found. See above for details.", issues + 1);
            return Ok(());
        }
    };

    if config.watch.downloads_dir.is_dir() {
        println!("  ✅ Downloads directory exists");
    } else {
        println!(
            "  ❌ Downloads directory missing: {}",
            config.watch.downloads_dir.display()
        );
        issues += 1;
    }

    if unzip_available(&config.extraction.unzip_command).await {
        println!("  ✅ `{}` found", config.extraction.unzip_command);
    } else {
        println!(
            "  ❌ `{}` not found, archives cannot be extracted",
            config.extraction.unzip_command
        );
        issues += 1;
    }

    match &config.routing.project_dir {
        Some(dir) if dir.is_dir() => println!("  ✅ Project directory exists"),
        Some(dir) => println!("  ⚠️  Project directory will be created: {}", dir.display()),
        None => println!("  ⚠️  No project directory, assets are not routed"),
    }

    let orchestrator = build_orchestrator(&config, EventBus::new(16), CancellationToken::new());
    for (method, healthy) in orchestrator.health().await {
        if healthy {
            println!("  ✅ {method} reachable");
        } else {
            println!("  ❌ {method} unreachable");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Whether `command` can be spawned at all.
async fn unzip_available(command: &str) -> bool {
    Command::new(command)
        .arg("-v")
        .output()
        .await
        .is_ok()
}
