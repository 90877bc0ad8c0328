//! Analytics event model: flat, typed payloads with app context.

use chrono::{DateTime, Utc};
use dropsort_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ── Property values ───────────────────────────────────────────────────────

/// A single payload value. Payloads stay flat: no nesting, no arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

// ── Context ───────────────────────────────────────────────────────────────

/// Where the event came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppContext {
    pub app_version: String,
    pub os: String,
    pub locale: String,
}

impl AppContext {
    pub fn new(app_version: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            os: std::env::consts::OS.to_string(),
            locale: locale.into(),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────

/// One analytics event as delivered to sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub event_type: String,
    pub properties: BTreeMap<String, PropertyValue>,
    pub context: AppContext,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(event_type: impl Into<String>, context: AppContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            properties: BTreeMap::new(),
            context,
            timestamp: Utc::now(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Flatten a domain event.
    pub fn from_domain(event: &DomainEvent, context: &AppContext) -> Self {
        let base = Self::new(event.event_type(), context.clone());
        let mut out = match event {
            DomainEvent::GroupCreated {
                group_key,
                expected_parts,
                ..
            } => base
                .with("group_key", group_key.as_str())
                .with("expected_parts", *expected_parts),
            DomainEvent::GroupCompleted {
                group_key,
                parts,
                assembly_ms,
                ..
            } => base
                .with("group_key", group_key.as_str())
                .with("parts", *parts)
                .with("assembly_ms", *assembly_ms),
            DomainEvent::GroupAbandoned {
                group_key,
                received_parts,
                expected_parts,
                idle_secs,
                ..
            } => base
                .with("group_key", group_key.as_str())
                .with("received_parts", *received_parts)
                .with("expected_parts", *expected_parts)
                .with("idle_secs", *idle_secs)
                .with(
                    "completion_ratio",
                    *received_parts as f64 / (*expected_parts).max(1) as f64,
                ),
            DomainEvent::GroupAnomaly {
                group_key,
                previous_total,
                declared_total,
                ..
            } => base
                .with("group_key", group_key.as_str())
                .with("previous_total", *previous_total)
                .with("declared_total", *declared_total),
            DomainEvent::ClassificationResolved {
                asset,
                asset_type,
                method,
                confidence,
                duration_ms,
                ..
            } => base
                .with("asset", asset.as_str())
                .with("asset_type", asset_type.label())
                .with("method", method.as_str())
                .with("confidence", confidence.as_str())
                .with("duration_ms", *duration_ms)
                .with("fallback", *method == dropsort_core::ClassificationMethod::Heuristic),
            DomainEvent::StrategyFailed {
                asset,
                method,
                reason,
                detail,
                ..
            } => base
                .with("asset", asset.as_str())
                .with("method", method.as_str())
                .with("reason", reason.as_str())
                .with("detail", detail.as_str()),
            DomainEvent::ErrorOccurred {
                context,
                error_message,
                ..
            } => base
                .with("context", context.as_str())
                .with("error_message", error_message.as_str()),
        };
        out.timestamp = event.timestamp();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropsort_core::{AssetType, ClassificationMethod, Confidence};

    fn ctx() -> AppContext {
        AppContext::new("0.1.0", "en-US")
    }

    #[test]
    fn classification_event_is_flat_and_typed() {
        let at = Utc::now();
        let event = AnalyticsEvent::from_domain(
            &DomainEvent::ClassificationResolved {
                asset: "Riser.wav".into(),
                asset_type: AssetType::SoundEffect,
                method: ClassificationMethod::Heuristic,
                confidence: Confidence::None,
                duration_ms: 42,
                timestamp: at,
            },
            &ctx(),
        );

        assert_eq!(event.event_type, "classification_resolved");
        assert_eq!(event.timestamp, at);
        assert_eq!(event.property("method"), Some(&PropertyValue::from("heuristic")));
        assert_eq!(event.property("duration_ms"), Some(&PropertyValue::Int(42)));
        assert_eq!(event.property("fallback"), Some(&PropertyValue::Bool(true)));
    }

    #[test]
    fn abandoned_event_carries_ratio() {
        let event = AnalyticsEvent::from_domain(
            &DomainEvent::GroupAbandoned {
                group_key: "Pack-20260205T124843Z-4".into(),
                received_parts: 1,
                expected_parts: 4,
                idle_secs: 7300,
                timestamp: Utc::now(),
            },
            &ctx(),
        );
        assert_eq!(
            event.property("completion_ratio"),
            Some(&PropertyValue::Double(0.25))
        );
    }

    #[test]
    fn serializes_untagged_values() {
        let event = AnalyticsEvent::new("group_created", ctx())
            .with("group_key", "Pack")
            .with("expected_parts", 3u32);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["properties"]["group_key"], "Pack");
        assert_eq!(json["properties"]["expected_parts"], 3);
        assert_eq!(json["context"]["os"], std::env::consts::OS);
    }
}
