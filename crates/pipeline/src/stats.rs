//! Running pipeline counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    fragments_seen: AtomicU64,
    groups_created: AtomicU64,
    groups_completed: AtomicU64,
    groups_abandoned: AtomicU64,
    assets_classified: AtomicU64,
    assets_routed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub fragments_seen: u64,
    pub groups_created: u64,
    pub groups_completed: u64,
    pub groups_abandoned: u64,
    pub assets_classified: u64,
    pub assets_routed: u64,
    pub errors: u64,
}

impl PipelineStats {
    pub fn fragment_seen(&self) {
        self.fragments_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn group_created(&self) {
        self.groups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn group_completed(&self) {
        self.groups_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn groups_abandoned(&self, n: u64) {
        self.groups_abandoned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn asset_classified(&self) {
        self.assets_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn asset_routed(&self) {
        self.assets_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fragments_seen: self.fragments_seen.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            groups_completed: self.groups_completed.load(Ordering::Relaxed),
            groups_abandoned: self.groups_abandoned.load(Ordering::Relaxed),
            assets_classified: self.assets_classified.load(Ordering::Relaxed),
            assets_routed: self.assets_routed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fragments={} groups created={} completed={} abandoned={} assets classified={} routed={} errors={}",
            self.fragments_seen,
            self.groups_created,
            self.groups_completed,
            self.groups_abandoned,
            self.assets_classified,
            self.assets_routed,
            self.errors
        )
    }
}
