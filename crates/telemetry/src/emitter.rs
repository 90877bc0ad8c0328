//! Analytics emitter: forwards domain events to sinks without ever
//! blocking or failing the pipeline.

use dropsort_core::event::{DomainEvent, EventBus};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{AnalyticsEvent, AppContext};
use crate::sink::AnalyticsSink;

/// Fans events out to every sink and keeps per-type counts.
pub struct AnalyticsEmitter {
    context: AppContext,
    sinks: Vec<Arc<dyn AnalyticsSink>>,
    counts: RwLock<BTreeMap<String, u64>>,
    failures: RwLock<u64>,
}

impl AnalyticsEmitter {
    pub fn new(context: AppContext) -> Self {
        Self {
            context,
            sinks: Vec::new(),
            counts: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(0),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Deliver one event to every sink. Delivery failures are logged and
    /// counted, never returned.
    pub async fn emit(&self, event: &DomainEvent) {
        let analytics = AnalyticsEvent::from_domain(event, &self.context);
        *self
            .counts
            .write()
            .unwrap()
            .entry(analytics.event_type.clone())
            .or_default() += 1;

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(&analytics).await {
                *self.failures.write().unwrap() += 1;
                warn!(sink = sink.name(), event_type = %analytics.event_type, error = %e, "Analytics delivery failed");
            }
        }
    }

    /// Events seen so far, by type.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.counts.read().unwrap().clone()
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.counts
            .read()
            .unwrap()
            .get(event_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn delivery_failures(&self) -> u64 {
        *self.failures.read().unwrap()
    }

    /// Subscribe to `bus` and emit in the background until `cancel` fires or
    /// the bus closes. A lagging subscriber skips what it missed.
    pub fn start(
        self: Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    r = rx.recv() => r,
                };
                match received {
                    Ok(event) => self.emit(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Analytics emitter lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // Flush whatever was already published before shutdown.
            while let Ok(event) = rx.try_recv() {
                self.emit(&event).await;
            }
            debug!("Analytics emitter stopped");
        })
    }
}
