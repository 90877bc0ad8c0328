//! Chain builder: assembles the orchestrator from configuration.

use dropsort_config::AppConfig;
use dropsort_core::classify::Strategy;
use dropsort_core::event::EventBus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::ChatStrategy;
use crate::orchestrator::{ClassificationOrchestrator, OrchestratorSettings};
use crate::web::WebLookupStrategy;

/// The model-based strategies enabled by `config`, in priority order.
///
/// With mood classification off, or a remote strategy enabled without an API
/// key, the corresponding strategies are left out and only the heuristic runs.
pub fn build_strategies(config: &AppConfig) -> Vec<Arc<dyn Strategy>> {
    let c = &config.classification;
    let mut strategies: Vec<Arc<dyn Strategy>> = Vec::new();

    if !c.mood_classification {
        info!("Model-based classification disabled, heuristic only");
        return strategies;
    }

    if c.local_model {
        strategies.push(Arc::new(ChatStrategy::local(&c.local)));
    }

    if c.remote_api {
        if c.remote.api_key.is_some() {
            strategies.push(Arc::new(ChatStrategy::remote(&c.remote)));
        } else {
            warn!("Remote classification enabled but no API key configured, skipping");
        }
    }

    if c.web_lookup {
        strategies.push(Arc::new(WebLookupStrategy::new(&c.web)));
    }

    strategies
}

/// Build the orchestrator for `config`, wired to `events` and `shutdown`.
pub fn build_orchestrator(
    config: &AppConfig,
    events: EventBus,
    shutdown: CancellationToken,
) -> ClassificationOrchestrator {
    let orchestrator = build_strategies(config).into_iter().fold(
        ClassificationOrchestrator::new(events)
            .with_settings(OrchestratorSettings::from(&config.classification))
            .with_shutdown(shutdown),
        |o, s| o.with_strategy(s),
    );

    info!(
        chain = ?orchestrator.methods(),
        min_confidence = %orchestrator.settings().min_confidence,
        "Classification chain ready"
    );
    orchestrator
}
