//! End-to-end integration tests for dropsort.
//!
//! These tests run the production classification chain, folder routing and
//! analytics emitter together, with a stub extractor standing in for
//! `unzip` and a mock HTTP server standing in for the remote model.

use async_trait::async_trait;
use chrono::Utc;
use dropsort_classifiers::build_orchestrator;
use dropsort_config::AppConfig;
use dropsort_core::classify::{AssetType, ClassificationMethod, Confidence};
use dropsort_core::error::ExtractionError;
use dropsort_core::event::EventBus;
use dropsort_core::group::CompletedGroup;
use dropsort_core::handoff::Extractor;
use dropsort_pipeline::{FolderRouter, Pipeline};
use dropsort_telemetry::build_emitter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Stub extractor ───────────────────────────────────────────────────────

/// Writes one file per name into `<out>/<group key>/`.
struct StubExtractor {
    out: PathBuf,
    names: Vec<&'static str>,
}

#[async_trait]
impl Extractor for StubExtractor {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(&self, group: &CompletedGroup) -> Result<Vec<PathBuf>, ExtractionError> {
        let dir = self.out.join(&group.group_key);
        std::fs::create_dir_all(&dir)?;
        Ok(self
            .names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, b"RIFF").unwrap();
                path
            })
            .collect())
    }
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-e2e",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"PK").unwrap();
    path
}

struct World {
    _dirs: Vec<tempfile::TempDir>,
    downloads: PathBuf,
    project: PathBuf,
    analytics: PathBuf,
    config: AppConfig,
    out: PathBuf,
}

fn world(remote_url: Option<String>) -> World {
    let dirs: Vec<tempfile::TempDir> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
    let downloads = dirs[0].path().to_path_buf();
    let project = dirs[1].path().to_path_buf();
    let out = dirs[2].path().to_path_buf();
    let analytics = out.join("events.jsonl");

    let mut config = AppConfig::default();
    config.watch.downloads_dir = downloads.clone();
    config.routing.project_dir = Some(project.clone());
    config.routing.move_files = true;
    config.telemetry.enabled = true;
    config.telemetry.jsonl_path = Some(analytics.clone());
    if let Some(url) = remote_url {
        config.classification.remote_api = true;
        config.classification.remote.api_url = url;
        config.classification.remote.api_key = Some("sk-e2e".into());
    }

    World {
        _dirs: dirs,
        downloads,
        project,
        analytics,
        config,
        out,
    }
}

fn pipeline(w: &World, events: &EventBus, names: Vec<&'static str>) -> Pipeline {
    Pipeline::new(
        w.config.clone(),
        events.clone(),
        build_orchestrator(&w.config, events.clone(), CancellationToken::new()),
        Arc::new(StubExtractor {
            out: w.out.join("extracted"),
            names,
        }),
        Arc::new(FolderRouter::new(&w.project).move_files(true)),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_answer_routes_assets_and_records_analytics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"asset_type":"music","confidence":"high","tags":["epic"]}"#,
        )))
        .mount(&server)
        .await;

    let w = world(Some(server.uri()));
    let events = EventBus::new(256);
    let emitter = Arc::new(build_emitter(&w.config.telemetry, "0.1.0").unwrap());
    let stop = CancellationToken::new();
    let emitter_handle = emitter.clone().start(&events, stop.clone());

    let pipeline = pipeline(&w, &events, vec!["Anthem.wav"]);
    pipeline.ingest_path(&touch(&w.downloads, "Finals-20260205T124843Z-2-002.zip"));
    pipeline.ingest_path(&touch(&w.downloads, "Finals-20260205T124843Z-2-001.zip"));

    let processed = pipeline.drain_at(Utc::now()).await;
    assert_eq!(processed.len(), 1);
    let item = &processed[0];
    assert_eq!(item.result.asset_type, AssetType::Music);
    assert_eq!(item.result.method, ClassificationMethod::RemoteLlm);
    assert_eq!(item.result.confidence, Confidence::High);

    let expected = w.project.join("Finals/Music/Anthem.wav");
    assert_eq!(item.destination.as_deref(), Some(expected.as_path()));
    assert!(expected.exists());
    assert!(!item.asset.path.exists());

    stop.cancel();
    emitter_handle.await.unwrap();

    let log = std::fs::read_to_string(&w.analytics).unwrap();
    let types: Vec<String> = log
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .map(|v| v["event_type"].as_str().unwrap().to_string())
        .collect();
    assert!(types.contains(&"group_created".to_string()));
    assert!(types.contains(&"group_completed".to_string()));
    assert!(types.contains(&"classification_resolved".to_string()));
    assert_eq!(emitter.count("classification_resolved"), 1);
}

#[tokio::test]
async fn failing_remote_falls_back_to_heuristic_folder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let w = world(Some(server.uri()));
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let pipeline = pipeline(&w, &events, vec!["Drone Shot.mov"]);
    pipeline.ingest_path(&touch(&w.downloads, "Broll-20260205T124843Z-1-001.zip"));

    let processed = pipeline.drain_at(Utc::now()).await;
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].result.method, ClassificationMethod::Heuristic);
    assert_eq!(processed[0].result.confidence, Confidence::None);
    assert!(w.project.join("Broll/Footage/Drone Shot.mov").exists());

    let failed = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| e.event_type() == "strategy_failed")
        .count();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn heuristic_only_config_never_calls_out() {
    let w = world(None);
    let events = EventBus::new(64);
    let pipeline = pipeline(&w, &events, vec!["Whoosh.wav", "Thumb.png"]);
    assert_eq!(pipeline.orchestrator().methods(), vec![ClassificationMethod::Heuristic]);

    pipeline.ingest_path(&touch(&w.downloads, "SFX Pack-20260205T124843Z-1-001.zip"));
    let processed = pipeline.drain_at(Utc::now()).await;

    assert_eq!(processed.len(), 2);
    assert!(processed.iter().all(|p| p.destination.is_some()));
    assert_eq!(pipeline.stats().assets_routed, 2);
}
