//! Routing of classified assets into a project folder.

use async_trait::async_trait;
use dropsort_core::classify::{Asset, ClassificationResult};
use dropsort_core::error::RoutingError;
use dropsort_core::handoff::Router;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const UNSORTED: &str = "Unsorted";

/// Files assets under `<project_dir>/<archive folder>/<type folder>/`.
pub struct FolderRouter {
    project_dir: PathBuf,
    move_files: bool,
}

impl FolderRouter {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            move_files: false,
        }
    }

    pub fn move_files(mut self, move_files: bool) -> Self {
        self.move_files = move_files;
        self
    }

    /// Directory an asset with `result` goes to.
    pub fn destination_dir(&self, asset: &Asset, result: &ClassificationResult) -> PathBuf {
        let folder = asset
            .source_folder
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(UNSORTED);
        self.project_dir
            .join(folder)
            .join(result.asset_type.folder_name())
    }

    async fn transfer(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        if self.move_files {
            match tokio::fs::rename(from, to).await {
                Ok(()) => return Ok(()),
                // Cross-device: fall back to copy then remove.
                Err(e) => debug!(error = %e, "Rename failed, copying instead"),
            }
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        } else {
            tokio::fs::copy(from, to).await.map(|_| ())
        }
    }
}

#[async_trait]
impl Router for FolderRouter {
    fn name(&self) -> &str {
        "folder"
    }

    async fn route(
        &self,
        asset: &Asset,
        result: &ClassificationResult,
    ) -> Result<PathBuf, RoutingError> {
        let dir = self.destination_dir(asset, result);
        tokio::fs::create_dir_all(&dir).await?;

        let destination = free_path(&dir, asset.file_name());
        self.transfer(asset.path(), &destination)
            .await
            .map_err(|e| RoutingError::TransferFailed {
                asset: asset.path.clone(),
                destination: destination.clone(),
                reason: e.to_string(),
            })?;

        info!(
            asset = %asset.file_name(),
            asset_type = %result.asset_type,
            destination = %destination.display(),
            "Asset routed"
        );
        Ok(destination)
    }
}

/// Logs the decision and leaves the file where it is. Used when no project
/// directory is configured.
#[derive(Debug, Default)]
pub struct LogRouter;

#[async_trait]
impl Router for LogRouter {
    fn name(&self) -> &str {
        "log"
    }

    async fn route(
        &self,
        asset: &Asset,
        result: &ClassificationResult,
    ) -> Result<PathBuf, RoutingError> {
        info!(
            asset = %asset.path.display(),
            asset_type = %result.asset_type,
            method = %result.method,
            confidence = %result.confidence,
            "No project directory configured, leaving asset in place"
        );
        Ok(asset.path.clone())
    }
}

/// `dir/name`, or `dir/stem (n).ext` when that is taken.
fn free_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropsort_core::classify::{Answer, AssetType, ClassificationMethod, Confidence};

    fn result(asset_type: AssetType) -> ClassificationResult {
        ClassificationResult::from_answer(
            Answer::new(asset_type, Confidence::High),
            ClassificationMethod::RemoteLlm,
            5,
        )
    }

    fn staged(dir: &Path, name: &str) -> Asset {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        let mut asset = Asset::new(path);
        asset.source_folder = Some("ROAD TO EWC".into());
        asset
    }

    #[tokio::test]
    async fn copies_into_type_folder() {
        let src = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let asset = staged(src.path(), "Crowd.wav");

        let router = FolderRouter::new(project.path());
        let dest = router
            .route(&asset, &result(AssetType::SoundEffect))
            .await
            .unwrap();

        assert_eq!(dest, project.path().join("ROAD TO EWC/SFX/Crowd.wav"));
        assert!(dest.exists());
        assert!(asset.path.exists());
    }

    #[tokio::test]
    async fn move_removes_source_and_avoids_clobbering() {
        let src = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let router = FolderRouter::new(project.path()).move_files(true);

        let first = staged(src.path(), "Theme.mp3");
        let a = router.route(&first, &result(AssetType::Music)).await.unwrap();
        let second = staged(src.path(), "Theme.mp3");
        let b = router.route(&second, &result(AssetType::Music)).await.unwrap();

        assert_eq!(a, project.path().join("ROAD TO EWC/Music/Theme.mp3"));
        assert_eq!(b, project.path().join("ROAD TO EWC/Music/Theme (1).mp3"));
        assert!(!second.path.exists());
    }

    #[tokio::test]
    async fn standalone_assets_go_to_unsorted() {
        let project = tempfile::tempdir().unwrap();
        let router = FolderRouter::new(project.path());
        let asset = Asset::new("/x/clip.mov");
        assert_eq!(
            router.destination_dir(&asset, &result(AssetType::Footage)),
            project.path().join("Unsorted/Footage")
        );
    }

    #[tokio::test]
    async fn log_router_leaves_file_in_place() {
        let asset = Asset::new("/x/clip.mov");
        let dest = LogRouter
            .route(&asset, &result(AssetType::Footage))
            .await
            .unwrap();
        assert_eq!(dest, PathBuf::from("/x/clip.mov"));
    }
}
