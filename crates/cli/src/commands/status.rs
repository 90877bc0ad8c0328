//! `dropsort status`: Survey fragments waiting in the downloads folder.

use chrono::{DateTime, Utc};
use dropsort_config::AppConfig;
use dropsort_core::event::EventBus;
use dropsort_grouping::{GroupRegistry, GroupSnapshot, GroupState};
use dropsort_pipeline::CompletionLedger;
use dropsort_pipeline::recovery::scan_fragments;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    println!("📥 dropsort Status");
    println!("=================");
    println!("  Config:      {}", super::config_file(config_path).display());
    println!("  Downloads:   {}", config.watch.downloads_dir.display());
    println!("  Extract to:  {}", config.extraction_dir().display());
    let strategies = config.enabled_strategies();
    println!(
        "  Strategies:  {}",
        if strategies.is_empty() {
            "heuristic only".to_string()
        } else {
            strategies.join(", ")
        }
    );

    let (groups, processed) = survey(&config);
    if processed > 0 {
        println!("  Processed:   {processed} archive(s) already extracted");
    }
    if groups.is_empty() {
        println!("\n  No fragments waiting");
        return Ok(());
    }

    let now = Utc::now();
    let stale_after = chrono::Duration::seconds(config.grouping.stale_after_secs as i64);
    println!();
    for g in &groups {
        println!(
            "  {} {}: {}/{} parts{}",
            marker(g, now, stale_after),
            g.group_key,
            g.received_parts.len(),
            g.expected_parts,
            match super::ingest::missing(&g.received_parts, g.expected_parts) {
                m if m.is_empty() => String::new(),
                m => format!(", missing {m:?}"),
            }
        );
    }

    Ok(())
}

/// Group what is on disk right now, using modification times as arrival
/// times. Archives in the ledger are counted, not listed.
pub(crate) fn survey(config: &AppConfig) -> (Vec<GroupSnapshot>, usize) {
    let ledger = CompletionLedger::open(config.ledger_path());
    let registry = GroupRegistry::new(EventBus::new(16));
    let mut processed = std::collections::HashSet::new();
    for found in scan_fragments(&config.watch.downloads_dir, config.watch.recursive) {
        if ledger.contains(&found.descriptor.group_key) {
            processed.insert(found.descriptor.group_key);
            continue;
        }
        registry.add_fragment_at(&found.descriptor, found.modified_at);
    }
    let mut groups = registry.snapshot();
    groups.sort_by(|a, b| a.group_key.cmp(&b.group_key));
    (groups, processed.len())
}

fn marker(group: &GroupSnapshot, now: DateTime<Utc>, stale_after: chrono::Duration) -> &'static str {
    match group.state {
        GroupState::Complete | GroupState::HandedOff => "✅",
        GroupState::Collecting if now - group.last_updated_at > stale_after => "💤",
        GroupState::Collecting => "⏳",
    }
}
