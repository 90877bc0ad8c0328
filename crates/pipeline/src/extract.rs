//! Archive extraction.
//!
//! Each fragment of a split download is a standalone zip holding a slice of
//! the original folder, so a complete group is extracted fragment by
//! fragment, in part order, into one output directory.

use async_trait::async_trait;
use dropsort_core::error::ExtractionError;
use dropsort_core::group::CompletedGroup;
use dropsort_core::handoff::Extractor;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Runs an `unzip`-compatible command per fragment.
pub struct UnzipExtractor {
    command: String,
    output_root: PathBuf,
    delete_fragments_after: bool,
}

impl UnzipExtractor {
    pub fn new(command: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            output_root: output_root.into(),
            delete_fragments_after: false,
        }
    }

    pub fn delete_fragments_after(mut self, delete: bool) -> Self {
        self.delete_fragments_after = delete;
        self
    }

    /// Output directory for a group.
    pub fn output_dir(&self, group: &CompletedGroup) -> PathBuf {
        self.output_root.join(sanitize(&group.group_key))
    }

    async fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
        debug!(archive = %archive.display(), dest = %dest.display(), "Extracting fragment");

        let output = Command::new(&self.command)
            .arg("-o")
            .arg("-qq")
            .arg(archive)
            .arg("-d")
            .arg(dest)
            .output()
            .await
            .map_err(|e| ExtractionError::CommandFailed {
                archive: archive.to_path_buf(),
                reason: format!("could not run '{}': {e}", self.command),
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(archive = %archive.display(), exit_code = code, "Extractor command failed");
            return Err(ExtractionError::CommandFailed {
                archive: archive.to_path_buf(),
                reason: format!("exit code {code}: {stderr}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Extractor for UnzipExtractor {
    fn name(&self) -> &str {
        "unzip"
    }

    async fn extract(&self, group: &CompletedGroup) -> Result<Vec<PathBuf>, ExtractionError> {
        for (_, path) in &group.parts {
            if !path.is_file() {
                return Err(ExtractionError::MissingFragment(path.clone()));
            }
        }

        let dest = self.output_dir(group);
        tokio::fs::create_dir_all(&dest).await?;

        let mut parts = group.parts.clone();
        parts.sort_by_key(|(n, _)| *n);
        for (_, path) in &parts {
            self.unzip(path, &dest).await?;
        }

        let files = list_files(&dest);
        info!(
            group_key = %group.group_key,
            files = files.len(),
            dest = %dest.display(),
            "Group extracted"
        );

        if self.delete_fragments_after {
            for (_, path) in &parts {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove extracted fragment");
                }
            }
        }

        Ok(files)
    }
}

/// Regular files under `dir`, sorted, skipping hidden entries and macOS
/// resource-fork folders.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && name != "__MACOSX"
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Make a group key safe to use as a directory name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(['.', ' '])
        .to_string()
}
