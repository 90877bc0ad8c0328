//! Completed-archive ledger.
//!
//! Fragment files usually stay in the downloads folder after their archive
//! has been extracted, so a restart would otherwise see every finished group
//! again. Each extracted group key is appended here as one JSON line; the
//! pipeline skips fragments whose key is recorded.

use chrono::{DateTime, Utc};
use dropsort_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub group_key: String,
    pub completed_at: DateTime<Utc>,
}

pub struct CompletionLedger {
    path: PathBuf,
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Serializes file writes.
    write: Mutex<()>,
}

impl CompletionLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "Completion ledger loaded");
        Self {
            path,
            entries: RwLock::new(entries),
            write: Mutex::new(()),
        }
    }

    fn load_from_disk(path: &Path) -> HashMap<String, DateTime<Utc>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) => Some((entry.group_key, entry.completed_at)),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted ledger line");
                    None
                }
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, group_key: &str) -> bool {
        self.entries.read().unwrap().contains_key(group_key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `group_key` as completed. Recording a key twice is a no-op.
    pub async fn record(&self, group_key: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write.lock().await;
        if self
            .entries
            .write()
            .unwrap()
            .insert(group_key.to_string(), at)
            .is_some()
        {
            return Ok(());
        }

        let mut line = serde_json::to_string(&LedgerEntry {
            group_key: group_key.to_string(),
            completed_at: at,
        })?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Drop every entry `keep` rejects and rewrite the file. Returns how many
    /// entries were dropped.
    pub async fn retain(&self, keep: impl Fn(&str) -> bool) -> Result<usize> {
        let _guard = self.write.lock().await;
        let (dropped, content) = {
            let mut entries = self.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|key, _| keep(key));
            let dropped = before - entries.len();
            if dropped == 0 {
                return Ok(0);
            }

            let mut sorted: Vec<LedgerEntry> = entries
                .iter()
                .map(|(k, at)| LedgerEntry {
                    group_key: k.clone(),
                    completed_at: *at,
                })
                .collect();
            sorted.sort_by_key(|e| e.completed_at);
            let mut content = String::new();
            for entry in &sorted {
                content.push_str(&serde_json::to_string(entry)?);
                content.push('\n');
            }
            (dropped, content)
        };

        tokio::fs::write(&self.path, content).await?;
        debug!(dropped, "Pruned completion ledger");
        Ok(dropped)
    }
}
