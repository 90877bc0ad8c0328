//! Domain event system: decoupled notification of pipeline outcomes.
//!
//! Events are published when something observable happens (a group is
//! created, completes or is abandoned, a classification resolves, a strategy
//! declines). Subscribers such as the analytics emitter react without the
//! grouping or classification code ever waiting on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::classify::{AssetType, ClassificationMethod, Confidence};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// First fragment of a new logical archive arrived
    GroupCreated {
        group_key: String,
        expected_parts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Every part arrived and the group was handed to extraction
    GroupCompleted {
        group_key: String,
        parts: u32,
        assembly_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The group went stale before all parts arrived
    GroupAbandoned {
        group_key: String,
        received_parts: u32,
        expected_parts: u32,
        idle_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// Fragments of one group disagreed about the total part count
    GroupAnomaly {
        group_key: String,
        previous_total: u32,
        declared_total: u32,
        timestamp: DateTime<Utc>,
    },

    /// The classification chain produced its result
    ClassificationResolved {
        asset: String,
        asset_type: AssetType,
        method: ClassificationMethod,
        confidence: Confidence,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One strategy declined or timed out
    StrategyFailed {
        asset: String,
        method: ClassificationMethod,
        reason: String,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator (extraction, routing, watcher) failed
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Stable snake_case name of the event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GroupCreated { .. } => "group_created",
            Self::GroupCompleted { .. } => "group_completed",
            Self::GroupAbandoned { .. } => "group_abandoned",
            Self::GroupAnomaly { .. } => "group_anomaly",
            Self::ClassificationResolved { .. } => "classification_resolved",
            Self::StrategyFailed { .. } => "strategy_failed",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::GroupCreated { timestamp, .. }
            | Self::GroupCompleted { timestamp, .. }
            | Self::GroupAbandoned { timestamp, .. }
            | Self::GroupAnomaly { timestamp, .. }
            | Self::ClassificationResolved { timestamp, .. }
            | Self::StrategyFailed { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. } => *timestamp,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing never
/// blocks; a slow subscriber lags and loses old events instead.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event_type = event.event_type(), "Publishing event");
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::GroupCreated {
            group_key: "Pack-20260205T124843Z-3".into(),
            expected_parts: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::GroupCreated {
                group_key,
                expected_parts,
                ..
            } => {
                assert_eq!(group_key, "Pack-20260205T124843Z-3");
                assert_eq!(*expected_parts, 3);
            }
            _ => panic!("Expected GroupCreated event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn event_type_names() {
        let event = DomainEvent::StrategyFailed {
            asset: "a.wav".into(),
            method: ClassificationMethod::RemoteLlm,
            reason: "timed_out".into(),
            detail: "after 20000ms".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "strategy_failed");
    }
}
