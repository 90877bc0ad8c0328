//! Analytics for dropsort.
//!
//! Domain events from the pipeline are flattened into typed key/value
//! payloads with app, OS and locale context, then handed to sinks (log,
//! JSON lines file, HTTP collector). Delivery is fire-and-forget.

pub mod emitter;
pub mod model;
pub mod sink;

pub use emitter::AnalyticsEmitter;
pub use model::{AnalyticsEvent, AppContext, PropertyValue};
pub use sink::{AnalyticsSink, HttpSink, JsonlSink, TracingSink};

use dropsort_config::TelemetryConfig;
use std::sync::Arc;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("collector rejected event (status: {status_code})")]
    Rejected { status_code: u16 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Build an emitter from configuration. Returns `None` when analytics are
/// disabled.
pub fn build_emitter(config: &TelemetryConfig, app_version: &str) -> Option<AnalyticsEmitter> {
    if !config.enabled {
        return None;
    }

    let mut emitter = AnalyticsEmitter::new(AppContext::new(app_version, &config.locale))
        .with_sink(Arc::new(TracingSink));
    if let Some(path) = &config.jsonl_path {
        emitter = emitter.with_sink(Arc::new(JsonlSink::new(path)));
    }
    if let Some(endpoint) = &config.endpoint {
        emitter = emitter.with_sink(Arc::new(HttpSink::new(endpoint)));
    }
    Some(emitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_builds_nothing() {
        let config = TelemetryConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(build_emitter(&config, "0.1.0").is_none());
    }

    #[test]
    fn sinks_follow_config() {
        let config = TelemetryConfig {
            jsonl_path: Some("/tmp/dropsort-events.jsonl".into()),
            endpoint: Some("http://localhost:9/events".into()),
            ..Default::default()
        };
        let emitter = build_emitter(&config, "0.1.0").unwrap();
        assert_eq!(emitter.sink_names(), vec!["tracing", "jsonl", "http"]);
        assert_eq!(emitter.context().locale, "en-US");
    }
}
