//! The dropsort pipeline.
//!
//! Wires the grouping engine to its edges: file paths come in from the
//! watcher (or the recovery scan, or the CLI), completed groups go out
//! through the sweeper to extraction, each extracted asset is classified
//! and routed. Extraction and routing failures are logged and published as
//! error events; they never stop the pipeline. Extracted group keys go into
//! a [`CompletionLedger`] so a restart does not process them again.

pub mod extract;
pub mod ledger;
pub mod recovery;
pub mod route;
pub mod stats;
pub mod watcher;

pub use extract::UnzipExtractor;
pub use ledger::{CompletionLedger, LedgerEntry};
pub use route::{FolderRouter, LogRouter};
pub use stats::{PipelineStats, StatsSnapshot};
pub use watcher::{WatchError, WatcherConfig, start_watching};

use chrono::{DateTime, Utc};
use dropsort_classifiers::{ClassificationOrchestrator, build_orchestrator};
use dropsort_config::AppConfig;
use dropsort_core::Error;
use dropsort_core::classify::{Asset, ClassificationResult};
use dropsort_core::event::{DomainEvent, EventBus};
use dropsort_core::fragment::{FragmentDescriptor, parse_fragment_path};
use dropsort_core::group::{CompletedGroup, GroupStatus};
use dropsort_core::handoff::{Extractor, Router};
use dropsort_grouping::{CompletionSweeper, GroupRegistry, SweeperConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome for one extracted asset.
#[derive(Debug, Clone)]
pub struct ProcessedAsset {
    pub asset: Asset,
    pub result: ClassificationResult,
    /// Final location, or `None` when routing failed.
    pub destination: Option<PathBuf>,
}

pub struct Pipeline {
    config: AppConfig,
    registry: Arc<GroupRegistry>,
    events: EventBus,
    orchestrator: Arc<ClassificationOrchestrator>,
    extractor: Arc<dyn Extractor>,
    router: Arc<dyn Router>,
    ledger: Arc<CompletionLedger>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Assemble a pipeline from parts. The orchestrator's shutdown token
    /// becomes the pipeline's root token; the ledger is read from
    /// `config.ledger_path()`.
    pub fn new(
        config: AppConfig,
        events: EventBus,
        orchestrator: ClassificationOrchestrator,
        extractor: Arc<dyn Extractor>,
        router: Arc<dyn Router>,
    ) -> Self {
        Self {
            registry: Arc::new(GroupRegistry::new(events.clone())),
            ledger: Arc::new(CompletionLedger::open(config.ledger_path())),
            shutdown: orchestrator.shutdown_token(),
            orchestrator: Arc::new(orchestrator),
            config,
            events,
            extractor,
            router,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Build the production pipeline: configured strategy chain, `unzip`
    /// extraction, folder routing when a project directory is set.
    pub fn from_config(config: AppConfig, events: EventBus, shutdown: CancellationToken) -> Self {
        let orchestrator = build_orchestrator(&config, events.clone(), shutdown);

        let extractor: Arc<dyn Extractor> = Arc::new(
            UnzipExtractor::new(&config.extraction.unzip_command, config.extraction_dir())
                .delete_fragments_after(config.extraction.delete_fragments_after),
        );

        let router: Arc<dyn Router> = match &config.routing.project_dir {
            Some(dir) => Arc::new(FolderRouter::new(dir).move_files(config.routing.move_files)),
            None => Arc::new(LogRouter),
        };

        Self::new(config, events, orchestrator, extractor, router)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn orchestrator(&self) -> &ClassificationOrchestrator {
        &self.orchestrator
    }

    pub fn ledger(&self) -> &CompletionLedger {
        &self.ledger
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Feed one file path into the registry. Non-fragments are ignored.
    pub fn ingest_path(&self, path: &Path) -> Option<(FragmentDescriptor, GroupStatus)> {
        self.ingest_path_at(path, Utc::now())
    }

    pub fn ingest_path_at(
        &self,
        path: &Path,
        at: DateTime<Utc>,
    ) -> Option<(FragmentDescriptor, GroupStatus)> {
        let Some(descriptor) = parse_fragment_path(path) else {
            debug!(path = %path.display(), "Not a fragment, ignoring");
            return None;
        };

        self.stats.fragment_seen();
        if self.ledger.contains(&descriptor.group_key) {
            debug!(group_key = %descriptor.group_key, "Archive already processed, ignoring fragment");
            return Some((descriptor, GroupStatus::AlreadyCompleteDuplicate));
        }

        let status = self.registry.add_fragment_at(&descriptor, at);
        // A single-part archive is created already complete
        let created = status == GroupStatus::Created
            || (status == GroupStatus::BecameComplete && descriptor.declared_total_parts == 1);
        if created {
            self.stats.group_created();
        }
        Some((descriptor, status))
    }

    /// Attach the download origin to a group.
    pub fn annotate_origin(&self, group_key: &str, origin: &str) -> bool {
        self.registry.annotate_origin(group_key, origin)
    }

    /// Re-ingest fragments already on disk, skipping archives the ledger
    /// lists as processed. Ledger entries whose fragments are gone are
    /// pruned. Returns how many fragments were re-ingested.
    pub async fn recover(&self) -> usize {
        let found = recovery::scan_fragments(
            &self.config.watch.downloads_dir,
            self.config.watch.recursive,
        );

        let on_disk: HashSet<&str> = found
            .iter()
            .map(|f| f.descriptor.group_key.as_str())
            .collect();
        if let Err(e) = self.ledger.retain(|key| on_disk.contains(key)).await {
            warn!(path = %self.ledger.path().display(), error = %e, "Failed to prune completion ledger");
        }

        let mut recovered = 0;
        for fragment in &found {
            if self.ledger.contains(&fragment.descriptor.group_key) {
                continue;
            }
            self.ingest_path_at(&fragment.descriptor.source_path, fragment.modified_at);
            recovered += 1;
        }

        let skipped = found.len() - recovered;
        if !found.is_empty() {
            info!(fragments = recovered, already_processed = skipped, "Recovered fragments from a previous run");
        }
        recovered
    }

    fn sweeper(&self) -> CompletionSweeper {
        CompletionSweeper::new(
            self.registry.clone(),
            self.events.clone(),
            SweeperConfig::from(&self.config.grouping),
        )
    }

    /// One sweep as of `now`, then process every group it handed off.
    pub async fn drain_at(&self, now: DateTime<Utc>) -> Vec<ProcessedAsset> {
        let report = self.sweeper().sweep_at(now);
        self.stats.groups_abandoned(report.abandoned.len() as u64);

        let mut processed = Vec::new();
        for group in report.completed {
            processed.extend(self.process_group(group).await);
        }
        processed
    }

    /// Extract a completed group and classify and route every asset in it.
    pub async fn process_group(&self, group: CompletedGroup) -> Vec<ProcessedAsset> {
        self.stats.group_completed();

        let files = match self.extractor.extract(&group).await {
            Ok(files) => files,
            Err(e) => {
                error!(group_key = %group.group_key, extractor = self.extractor.name(), error = %e, "Extraction failed");
                self.report_error(format!("extract {}", group.group_key), e.into());
                return Vec::new();
            }
        };

        if let Err(e) = self.ledger.record(&group.group_key, Utc::now()).await {
            warn!(group_key = %group.group_key, error = %e, "Failed to record completed archive");
            self.report_error(format!("ledger {}", group.group_key), e);
        }

        let assets = files.into_iter().map(|path| Asset {
            path,
            group_key: Some(group.group_key.clone()),
            source_folder: Some(group.folder_name.clone()),
            origin_hint: group.origin_hint.clone(),
        });

        futures::future::join_all(assets.map(|asset| self.process_asset(asset))).await
    }

    /// Classify and route one asset.
    pub async fn process_asset(&self, asset: Asset) -> ProcessedAsset {
        let result = self.orchestrator.classify(&asset).await;
        self.stats.asset_classified();

        let destination = match self.router.route(&asset, &result).await {
            Ok(dest) => {
                self.stats.asset_routed();
                Some(dest)
            }
            Err(e) => {
                warn!(asset = %asset.path.display(), router = self.router.name(), error = %e, "Routing failed");
                self.report_error(format!("route {}", asset.file_name()), e.into());
                None
            }
        };

        ProcessedAsset {
            asset,
            result,
            destination,
        }
    }

    /// Classify a standalone file without routing it.
    pub async fn classify_path(&self, path: &Path) -> ClassificationResult {
        self.orchestrator.classify(&Asset::new(path)).await
    }

    fn report_error(&self, context: String, error: Error) {
        self.stats.error();
        self.events.publish(DomainEvent::ErrorOccurred {
            context,
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Run until shutdown, ingesting `paths` as they arrive.
    ///
    /// Completed groups are processed concurrently. On shutdown the sweeper
    /// stops, groups already handed off are still processed (their
    /// classifications resolve through the heuristic) and the final stats
    /// are returned.
    pub async fn run(self: Arc<Self>, mut paths: mpsc::Receiver<PathBuf>) -> StatsSnapshot {
        let mut bus_rx = self.events.subscribe();
        let (mut completed_rx, sweeper_handle) = self.sweeper().start(self.shutdown.child_token());
        let mut tasks: JoinSet<usize> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                path = paths.recv() => match path {
                    Some(path) => {
                        self.ingest_path(&path);
                    }
                    None => {
                        warn!("Path source closed, stopping pipeline");
                        break;
                    }
                },
                group = completed_rx.recv() => match group {
                    Some(group) => {
                        let this = self.clone();
                        tasks.spawn(async move { this.process_group(group).await.len() });
                    }
                    None => break,
                },
                event = bus_rx.recv() => {
                    if let Ok(event) = event {
                        if matches!(event.as_ref(), DomainEvent::GroupAbandoned { .. }) {
                            self.stats.groups_abandoned(1);
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Group processing task failed");
                    }
                }
            }
        }

        self.shutdown.cancel();
        if let Err(e) = sweeper_handle.await {
            error!(error = %e, "Sweeper task failed");
        }
        while let Ok(group) = completed_rx.try_recv() {
            let this = self.clone();
            tasks.spawn(async move { this.process_group(group).await.len() });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Group processing task failed");
            }
        }

        let stats = self.stats.snapshot();
        info!(%stats, "Pipeline stopped");
        stats
    }

    /// Watch the downloads folder until shutdown.
    pub async fn watch(self: Arc<Self>) -> Result<StatsSnapshot, WatchError> {
        let (paths, watcher_handle) = start_watching(
            WatcherConfig::from(&self.config.watch),
            self.shutdown.child_token(),
        )?;

        // Scan after the watcher is up so nothing slips between the two;
        // a fragment seen twice is a duplicate.
        if self.config.watch.scan_on_start {
            self.recover().await;
        }

        let stats = self.clone().run(paths).await;
        if let Err(e) = watcher_handle.await {
            error!(error = %e, "Watcher task failed");
        }
        Ok(stats)
    }
}
