//! Completion sweeper: hands complete groups to extraction and reaps
//! abandoned ones.
//!
//! Runs as its own background task, off the filesystem-event path. Each pass
//! goes through the registry's per-key check-and-transition operations, so a
//! fragment racing a sweep is either merged before the decision or starts a
//! fresh group after it; it is never dropped.

use chrono::{DateTime, Utc};
use dropsort_config::GroupingConfig;
use dropsort_core::event::{DomainEvent, EventBus};
use dropsort_core::group::{AbandonedGroup, CompletedGroup};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::GroupRegistry;

/// Sweeper timing and cleanup policy.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub stale_after: Duration,
    pub delete_abandoned_fragments: bool,
}

impl From<&GroupingConfig> for SweeperConfig {
    fn from(config: &GroupingConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            stale_after: config.stale_after(),
            delete_abandoned_fragments: config.delete_abandoned_fragments,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from(&GroupingConfig::default())
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub completed: Vec<CompletedGroup>,
    pub abandoned: Vec<AbandonedGroup>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.abandoned.is_empty()
    }
}

pub struct CompletionSweeper {
    registry: Arc<GroupRegistry>,
    events: EventBus,
    config: SweeperConfig,
}

impl CompletionSweeper {
    pub fn new(registry: Arc<GroupRegistry>, events: EventBus, config: SweeperConfig) -> Self {
        Self {
            registry,
            events,
            config,
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run one pass as of `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        let completed = self.registry.take_completed(now);
        for group in &completed {
            info!(
                group_key = %group.group_key,
                parts = group.parts.len(),
                assembly_ms = group.assembly_ms(),
                "Handing complete group to extraction"
            );
            self.events.publish(DomainEvent::GroupCompleted {
                group_key: group.group_key.clone(),
                parts: group.parts.len() as u32,
                assembly_ms: group.assembly_ms(),
                timestamp: now,
            });
        }

        let abandoned = self.registry.reap_stale(now, stale_after);
        for group in &abandoned {
            let idle_secs = now
                .signed_duration_since(group.last_updated_at)
                .num_seconds()
                .max(0) as u64;
            warn!(
                group_key = %group.group_key,
                received = group.received.len(),
                expected = group.expected_parts,
                missing = ?group.missing_parts(),
                idle_secs,
                "Abandoning incomplete group"
            );
            self.events.publish(DomainEvent::GroupAbandoned {
                group_key: group.group_key.clone(),
                received_parts: group.received.len() as u32,
                expected_parts: group.expected_parts,
                idle_secs,
                timestamp: now,
            });

            if self.config.delete_abandoned_fragments {
                remove_fragments(group.received.iter().map(|(_, p)| p));
            }
        }

        SweepReport {
            completed,
            abandoned,
        }
    }

    /// Start the sweeper background loop.
    ///
    /// Returns a channel receiver that emits completed groups (the caller is
    /// responsible for feeding them into extraction) and a join handle. The
    /// loop wakes on every interval tick and as soon as a group completes; it
    /// stops when `cancel` fires or the receiver is dropped.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<CompletedGroup>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<CompletedGroup>(64);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sweeper cancelled");
                        return;
                    }
                    _ = interval.tick() => {}
                    _ = self.registry.completed_notified() => {}
                }

                // A closed receiver must not tombstone groups nobody will extract.
                if tx.is_closed() {
                    error!("Extraction receiver dropped, stopping sweeper");
                    return;
                }

                let report = self.sweep_at(Utc::now());
                if !deliver(&tx, report.completed).await.is_empty() {
                    return;
                }
            }
        });

        (rx, handle)
    }
}

/// Send `groups` in order. On a closed channel every group still unsent is
/// logged and returned by key.
async fn deliver(tx: &mpsc::Sender<CompletedGroup>, groups: Vec<CompletedGroup>) -> Vec<String> {
    let mut pending = groups.into_iter();
    while let Some(group) = pending.next() {
        if let Err(mpsc::error::SendError(group)) = tx.send(group).await {
            let undelivered: Vec<String> = std::iter::once(group)
                .chain(pending)
                .map(|g| g.group_key)
                .collect();
            for key in &undelivered {
                error!(group_key = %key, "Completed group not delivered, extraction receiver dropped");
            }
            return undelivered;
        }
    }
    Vec::new()
}

fn remove_fragments<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed abandoned fragment"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove abandoned fragment"),
        }
    }
}
