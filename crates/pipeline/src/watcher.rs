//! Downloads-folder watcher.
//!
//! Receives events from [`notify`] through an `mpsc` channel, debounces them
//! per path (browsers write, rename and touch a download several times in a
//! row) and forwards each settled file path once. Filtering for fragment
//! names happens downstream.

use dropsort_config::WatchConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Watched directory does not exist: {0}")]
    DirectoryMissing(PathBuf),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Configuration for the downloads watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub dir: PathBuf,
    pub recursive: bool,
    pub debounce: Duration,
}

impl From<&WatchConfig> for WatcherConfig {
    fn from(config: &WatchConfig) -> Self {
        Self {
            dir: config.downloads_dir.clone(),
            recursive: config.recursive,
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }
}

/// Start watching `config.dir`.
///
/// Returns a receiver of settled file paths and the task handle. The task
/// stops when `cancel` fires.
pub fn start_watching(
    config: WatcherConfig,
    cancel: CancellationToken,
) -> Result<(mpsc::Receiver<PathBuf>, tokio::task::JoinHandle<()>), WatchError> {
    if !config.dir.is_dir() {
        return Err(WatchError::DirectoryMissing(config.dir));
    }

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let (path_tx, path_rx) = mpsc::channel::<PathBuf>(256);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = event_tx.blocking_send(event);
            }
            Err(e) => warn!(error = %e, "File watcher reported an error"),
        },
        notify::Config::default(),
    )?;

    let mode = if config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(&config.dir, mode)?;
    info!(path = %config.dir.display(), recursive = config.recursive, "Watching downloads");

    let debounce = config.debounce;
    let handle = tokio::spawn(async move {
        // Keep the watcher alive for the duration of the task.
        let _watcher = watcher;
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            let next_due = pending.values().min().copied();

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Watcher cancelled");
                    break;
                }
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        let due = Instant::now() + debounce;
                        for path in event.paths {
                            pending.insert(path, due);
                        }
                    }
                }
                _ = async {
                    match next_due {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                }, if next_due.is_some() => {
                    let now = Instant::now();
                    let settled: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, due)| **due <= now)
                        .map(|(p, _)| p.clone())
                        .collect();
                    for path in settled {
                        pending.remove(&path);
                        if !path.is_file() {
                            continue;
                        }
                        debug!(path = %path.display(), "Download settled");
                        if path_tx.send(path).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    Ok((path_rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_an_error() {
        let err = start_watching(
            WatcherConfig {
                dir: PathBuf::from("/definitely/not/here"),
                recursive: false,
                debounce: Duration::from_millis(10),
            },
            CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, WatchError::DirectoryMissing(_)));
    }

    #[test]
    fn config_from_watch_section() {
        let watch = WatchConfig {
            downloads_dir: "/tmp/dl".into(),
            recursive: true,
            debounce_ms: 400,
            scan_on_start: true,
        };
        let config = WatcherConfig::from(&watch);
        assert_eq!(config.dir, PathBuf::from("/tmp/dl"));
        assert!(config.recursive);
        assert_eq!(config.debounce, Duration::from_millis(400));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn forwards_new_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let (mut rx, handle) = start_watching(
            WatcherConfig {
                dir: dir.path().to_path_buf(),
                recursive: false,
                debounce: Duration::from_millis(200),
            },
            cancel.clone(),
        )
        .unwrap();

        let path = dir.path().join("Pack-20260205T124843Z-2-001.zip");
        std::fs::write(&path, b"PK").unwrap();
        std::fs::write(&path, b"PK\x03\x04").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should report the file")
            .unwrap();
        assert_eq!(got.file_name(), path.file_name());

        let again = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(again.is_err(), "debounced writes should be reported once");

        cancel.cancel();
        handle.await.unwrap();
    }
}
