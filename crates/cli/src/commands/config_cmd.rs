//! `dropsort config`: Configuration management commands.

use std::path::Path;

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            // Checks that load fine but will not behave as intended
            let mut warnings = Vec::new();
            let c = &config.classification;

            if c.remote_api && c.remote.api_key.is_none() {
                warnings.push("remote_api enabled without an API key (set DROPSORT_API_KEY or OPENAI_API_KEY)");
            }

            if c.mood_classification && !c.local_model && !c.remote_api && !c.web_lookup {
                warnings.push("mood_classification on but no strategy enabled, only the heuristic will run");
            }

            if !config.watch.downloads_dir.is_dir() {
                warnings.push("Downloads directory does not exist");
            }

            if config.routing.project_dir.is_none() {
                warnings.push("No routing.project_dir, assets will stay in the extraction folder");
            }

            if config.telemetry.enabled
                && config.telemetry.jsonl_path.is_none()
                && config.telemetry.endpoint.is_none()
            {
                warnings.push("Telemetry enabled with no jsonl_path or endpoint, events only go to the log");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Downloads:   {}", config.watch.downloads_dir.display());
            println!("   Stale after: {}s", config.grouping.stale_after_secs);
            println!("   Confidence:  ≥ {}", c.min_confidence);
            println!(
                "   Budget:      {}s total, {}s per strategy",
                c.total_budget_secs, c.strategy_timeout_secs
            );
            println!("   Strategies:  {:?}", config.enabled_strategies());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.classification.remote.api_key.is_some() {
        config.classification.remote.api_key = Some("********".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(config_path).display());
    Ok(())
}
