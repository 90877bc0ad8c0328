//! Classification orchestrator: ordered strategy chain with per-strategy
//! timeouts, a global budget and a guaranteed result.
//!
//! Strategies are tried in fixed priority order (local model, remote LLM,
//! web lookup). The first answer at or above the minimum confidence wins.
//! Declines, timeouts and low-confidence answers fall through to the next
//! strategy; the heuristic closes the chain and never declines.

use chrono::Utc;
use dropsort_config::ClassificationConfig;
use dropsort_core::classify::{
    Answer, Asset, AssetType, ClassificationMethod, ClassificationResult, Confidence, Strategy,
};
use dropsort_core::error::StrategyError;
use dropsort_core::event::{DomainEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::heuristic::HeuristicStrategy;

/// Thresholds and limits for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub min_confidence: Confidence,
    pub strategy_timeout: Duration,
    pub total_budget: Duration,
    pub max_concurrent: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ClassificationConfig::default())
    }
}

impl From<&ClassificationConfig> for OrchestratorSettings {
    fn from(config: &ClassificationConfig) -> Self {
        Self {
            min_confidence: config.min_confidence(),
            strategy_timeout: config.strategy_timeout(),
            total_budget: config.total_budget(),
            max_concurrent: config.max_concurrent.max(1),
        }
    }
}

/// Runs the strategy chain for one asset at a time, many assets in parallel.
pub struct ClassificationOrchestrator {
    chain: Vec<Arc<dyn Strategy>>,
    heuristic: Arc<dyn Strategy>,
    settings: OrchestratorSettings,
    events: EventBus,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

/// Best below-threshold answer seen so far.
struct Candidate {
    answer: Answer,
    method: ClassificationMethod,
}

impl ClassificationOrchestrator {
    /// Create an orchestrator with only the built-in heuristic.
    pub fn new(events: EventBus) -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            chain: Vec::new(),
            heuristic: Arc::new(HeuristicStrategy::new()),
            permits: Arc::new(Semaphore::new(settings.max_concurrent)),
            settings,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        self.settings = settings;
        self
    }

    /// Add a strategy. The chain is kept in priority order whatever the
    /// insertion order; a heuristic-method strategy replaces the built-in one.
    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        if strategy.method() == ClassificationMethod::Heuristic {
            self.heuristic = strategy;
            return self;
        }
        self.chain.push(strategy);
        self.chain.sort_by_key(|s| s.method());
        self
    }

    /// Use `token` as the root shutdown signal. Cancelling it makes every
    /// in-flight classification resolve through the heuristic.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Methods that will be attempted, in order, heuristic last.
    pub fn methods(&self) -> Vec<ClassificationMethod> {
        self.chain
            .iter()
            .map(|s| s.method())
            .chain(std::iter::once(ClassificationMethod::Heuristic))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chain.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Classify one asset. Always returns a result within the total budget.
    pub async fn classify(&self, asset: &Asset) -> ClassificationResult {
        let started = Instant::now();
        let deadline = started + self.settings.total_budget;
        let name = asset.file_name().to_string();

        let mut best: Option<Candidate> = None;
        let mut accepted: Option<Candidate> = None;

        // Waiting for a permit counts against the budget.
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            p = tokio::time::timeout_at(deadline, self.permits.clone().acquire_owned()) => {
                p.ok().and_then(|p| p.ok())
            }
        };

        if permit.is_none() && !self.chain.is_empty() {
            warn!(asset = %name, "No classification slot within budget, using heuristic");
        }

        if permit.is_some() {
            for (i, strategy) in self.chain.iter().enumerate() {
                let method = strategy.method();
                if self.shutdown.is_cancelled() {
                    debug!(asset = %name, "Shutdown requested, skipping remaining strategies");
                    break;
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(asset = %name, "Classification budget exhausted");
                    break;
                }
                let limit = self.settings.strategy_timeout.min(remaining);

                debug!(
                    asset = %name,
                    method = %method,
                    attempt = i + 1,
                    total = self.chain.len(),
                    "Trying strategy"
                );

                match self.attempt(strategy.as_ref(), asset, limit).await {
                    Ok(answer) if answer.confidence >= self.settings.min_confidence => {
                        accepted = Some(Candidate { answer, method });
                        break;
                    }
                    Ok(answer) => {
                        debug!(
                            asset = %name,
                            method = %method,
                            confidence = %answer.confidence,
                            "Answer below threshold, trying next"
                        );
                        self.publish_failure(
                            &name,
                            method,
                            "below_threshold",
                            format!("{} at {}", answer.asset_type, answer.confidence),
                        );
                        if best
                            .as_ref()
                            .is_none_or(|b| answer.confidence > b.answer.confidence)
                        {
                            best = Some(Candidate { answer, method });
                        }
                    }
                    Err(e) => {
                        warn!(asset = %name, method = %method, error = %e, "Strategy declined, trying next");
                        self.publish_failure(&name, method, e.kind(), e.to_string());
                    }
                }
            }
        }
        drop(permit);

        let chosen = match accepted {
            Some(c) => c,
            None => {
                let fallback = self.run_heuristic(asset).await;
                match best {
                    Some(b) if b.answer.confidence > fallback.confidence => b,
                    _ => Candidate {
                        answer: fallback,
                        method: ClassificationMethod::Heuristic,
                    },
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = ClassificationResult::from_answer(chosen.answer, chosen.method, duration_ms);

        info!(
            asset = %name,
            asset_type = %result.asset_type,
            method = %result.method,
            confidence = %result.confidence,
            duration_ms,
            "Classification resolved"
        );
        self.events.publish(DomainEvent::ClassificationResolved {
            asset: name,
            asset_type: result.asset_type,
            method: result.method,
            confidence: result.confidence,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    /// One bounded attempt. A timeout or shutdown is reported as a decline;
    /// either way the strategy's token is cancelled so spawned work stops.
    async fn attempt(
        &self,
        strategy: &dyn Strategy,
        asset: &Asset,
        limit: Duration,
    ) -> Result<Answer, StrategyError> {
        let token = self.shutdown.child_token();
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(StrategyError::Cancelled),
            r = tokio::time::timeout(limit, strategy.attempt(asset, token.clone())) => match r {
                Ok(r) => r,
                Err(_) => Err(StrategyError::TimedOut {
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
        };
        token.cancel();
        outcome
    }

    async fn run_heuristic(&self, asset: &Asset) -> Answer {
        match self
            .heuristic
            .attempt(asset, CancellationToken::new())
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(asset = %asset.file_name(), error = %e, "Heuristic declined, reporting unknown");
                Answer::new(AssetType::Unknown, Confidence::LOWEST)
            }
        }
    }

    fn publish_failure(
        &self,
        asset: &str,
        method: ClassificationMethod,
        reason: &str,
        detail: String,
    ) {
        self.events.publish(DomainEvent::StrategyFailed {
            asset: asset.to_string(),
            method,
            reason: reason.to_string(),
            detail,
            timestamp: Utc::now(),
        });
    }

    /// Probe every configured backend.
    pub async fn health(&self) -> Vec<(ClassificationMethod, bool)> {
        let mut out = Vec::with_capacity(self.chain.len());
        for strategy in &self.chain {
            let ok = matches!(
                tokio::time::timeout(self.settings.strategy_timeout, strategy.health_check()).await,
                Ok(Ok(true))
            );
            out.push((strategy.method(), ok));
        }
        out
    }
}
