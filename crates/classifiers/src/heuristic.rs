//! Extension and keyword heuristic: the terminal strategy.
//!
//! Never declines. Its answers always carry `Confidence::None` so that any
//! model-based answer, however weak, ranks above it.

use async_trait::async_trait;
use dropsort_core::classify::{Answer, Asset, AssetType, ClassificationMethod, Confidence, Strategy};
use dropsort_core::error::StrategyError;
use tokio_util::sync::CancellationToken;

const AUDIO: &[&str] = &["wav", "mp3", "aif", "aiff", "flac", "ogg", "m4a", "aac", "opus"];
const VIDEO: &[&str] = &["mp4", "mov", "mxf", "avi", "mkv", "webm", "m4v", "r3d", "braw"];
const IMAGE: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "psd", "exr", "webp", "gif", "heic", "svg", "dpx",
];
const TEMPLATE: &[&str] = &[
    "mogrt", "aep", "aet", "prproj", "drp", "drfx", "cube", "3dl", "look", "ffx", "prfpset",
];
const DOCUMENT: &[&str] = &["pdf", "txt", "md", "rtf", "doc", "docx", "html", "htm"];

const SFX_WORDS: &[&str] = &[
    "sfx", "whoosh", "swoosh", "impact", "hit", "riser", "boom", "foley", "swish", "glitch",
    "transition", "click", "ambience", "ambient", "stinger",
];

/// Classifies by file extension, refined by name and folder keywords.
#[derive(Debug, Default, Clone)]
pub struct HeuristicStrategy;

impl HeuristicStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Pure classification, no I/O.
    pub fn guess(asset: &Asset) -> Answer {
        let ext = asset.extension().unwrap_or_default();
        let words = keywords(asset);

        let (asset_type, why) = if AUDIO.contains(&ext.as_str()) {
            if words.iter().any(|w| SFX_WORDS.contains(&w.as_str())) {
                (AssetType::SoundEffect, format!("audio .{ext} with effect keyword"))
            } else {
                (AssetType::Music, format!("audio .{ext}"))
            }
        } else if VIDEO.contains(&ext.as_str()) {
            (AssetType::Footage, format!("video .{ext}"))
        } else if IMAGE.contains(&ext.as_str()) {
            (AssetType::Image, format!("image .{ext}"))
        } else if TEMPLATE.contains(&ext.as_str()) {
            (AssetType::Template, format!("template .{ext}"))
        } else if DOCUMENT.contains(&ext.as_str()) {
            (AssetType::Document, format!("document .{ext}"))
        } else {
            (AssetType::Unknown, "unrecognised extension".to_string())
        };

        Answer::new(asset_type, Confidence::None).with_rationale(why)
    }
}

/// Lower-cased words from the file stem and the nearest parent folders.
fn keywords(asset: &Asset) -> Vec<String> {
    std::iter::once(asset.stem())
        .chain(asset.parent_names())
        .flat_map(|s| s.split(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Strategy for HeuristicStrategy {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::Heuristic
    }

    async fn attempt(
        &self,
        asset: &Asset,
        _cancel: CancellationToken,
    ) -> Result<Answer, StrategyError> {
        Ok(Self::guess(asset))
    }
}
