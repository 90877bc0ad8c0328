//! Collaborator traits at the edges of the core: extraction of a completed
//! group and routing of a classified asset.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::classify::{Asset, ClassificationResult};
use crate::error::{ExtractionError, RoutingError};
use crate::group::CompletedGroup;

/// Turns a complete logical archive into the media files it contained.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract every fragment of `group` and return the extracted files.
    async fn extract(&self, group: &CompletedGroup) -> Result<Vec<PathBuf>, ExtractionError>;
}

/// Files a classified asset into the destination project.
#[async_trait]
pub trait Router: Send + Sync {
    fn name(&self) -> &str;

    /// Route `asset` according to `result`; returns the asset's final location.
    async fn route(
        &self,
        asset: &Asset,
        result: &ClassificationResult,
    ) -> Result<PathBuf, RoutingError>;
}
