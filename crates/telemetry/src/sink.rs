//! Analytics sinks: where events go.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::TelemetryError;
use crate::model::AnalyticsEvent;

/// A destination for analytics events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), TelemetryError>;
}

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), TelemetryError> {
        let props = event
            .properties
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "dropsort::analytics", event_type = %event.event_type, "{props}");
        Ok(())
    }
}

/// Appends events as JSON lines to a file.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnalyticsSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), TelemetryError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// POSTs each event as JSON to a collector endpoint.
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl AnalyticsSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, event: &AnalyticsEvent) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                status_code: status.as_u16(),
            });
        }
        Ok(())
    }
}
