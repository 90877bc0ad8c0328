//! Strategy trait: the abstraction over classification backends.
//!
//! A Strategy looks at one extracted asset and either answers with a type
//! and a confidence level, or declines. The orchestrator tries strategies
//! in priority order and never knows which backend it is talking to.
//!
//! Implementations: local inference server, remote LLM API, web lookup,
//! and the extension/keyword heuristic that never declines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use crate::error::StrategyError;

/// Media category used to route an asset into a project folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Music,
    SoundEffect,
    Footage,
    Image,
    Template,
    Document,
    Unknown,
}

impl AssetType {
    /// Every concrete category, in prompt order.
    pub const ALL: [AssetType; 7] = [
        Self::Music,
        Self::SoundEffect,
        Self::Footage,
        Self::Image,
        Self::Template,
        Self::Document,
        Self::Unknown,
    ];

    /// Canonical label used in prompts, events and config.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::SoundEffect => "sound_effect",
            Self::Footage => "footage",
            Self::Image => "image",
            Self::Template => "template",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }

    /// Folder the router files this category under.
    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Music => "Music",
            Self::SoundEffect => "SFX",
            Self::Footage => "Footage",
            Self::Image => "Images",
            Self::Template => "Templates",
            Self::Document => "Documents",
            Self::Unknown => "Other",
        }
    }

    /// Lenient label lookup: accepts the canonical label and common synonyms
    /// returned by models and web pages.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        let t = match normalized.as_str() {
            "music" | "song" | "track" | "soundtrack" => Self::Music,
            "sound_effect" | "sfx" | "sound_effects" | "sound" => Self::SoundEffect,
            "footage" | "video" | "clip" | "b_roll" | "broll" | "stock_footage" => Self::Footage,
            "image" | "photo" | "picture" | "still" | "graphic" => Self::Image,
            "template" | "motion_graphics" | "mogrt" | "preset" | "lut" => Self::Template,
            "document" | "doc" | "text" | "license" => Self::Document,
            "unknown" | "other" => Self::Unknown,
            _ => return None,
        };
        Some(t)
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered qualitative certainty. `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// The lowest defined level.
    pub const LOWEST: Confidence = Confidence::None;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "unknown confidence level '{other}' (expected none, low, medium or high)"
            )),
        }
    }
}

/// Which strategy produced an answer. Declaration order is chain priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    LocalModel,
    RemoteLlm,
    WebLookup,
    Heuristic,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalModel => "local_model",
            Self::RemoteLlm => "remote_llm",
            Self::WebLookup => "web_lookup",
            Self::Heuristic => "heuristic",
        }
    }
}

impl std::fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted file to classify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Location of the extracted file.
    pub path: PathBuf,

    /// Group the asset came from, if it was part of a multi-part archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,

    /// Folder name of the originating archive ("ROAD TO EWC").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_folder: Option<String>,

    /// Where the archive was downloaded from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_hint: Option<String>,
}

impl Asset {
    /// A standalone asset with no archive context.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            group_key: None,
            source_folder: None,
            origin_hint: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// File name without extension.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Parent directory names inside the extraction root, nearest first.
    pub fn parent_names(&self) -> Vec<&str> {
        self.path
            .ancestors()
            .skip(1)
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .take(3)
            .collect()
    }
}

/// A strategy's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub asset_type: AssetType,
    pub confidence: Confidence,

    /// Mood/genre style labels ("epic", "lo-fi").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Short reason given by the strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Answer {
    pub fn new(asset_type: AssetType, confidence: Confidence) -> Self {
        Self {
            asset_type,
            confidence,
            tags: Vec::new(),
            rationale: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// The single, immutable outcome of one classification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub asset_type: AssetType,
    pub confidence: Confidence,
    /// The strategy that produced `asset_type`.
    pub method: ClassificationMethod,
    /// Whole-orchestration wall-clock time.
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ClassificationResult {
    pub fn from_answer(answer: Answer, method: ClassificationMethod, duration_ms: u64) -> Self {
        Self {
            asset_type: answer.asset_type,
            confidence: answer.confidence,
            method,
            duration_ms,
            tags: answer.tags,
            rationale: answer.rationale,
        }
    }
}

/// The core Strategy trait.
///
/// `attempt` returns `Err` to decline; every error variant is a decline, not
/// a failure. Implementations must observe `cancel` for any work they spawn
/// outside the returned future (dropping the future covers the rest).
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Which method this strategy reports in results.
    fn method(&self) -> ClassificationMethod;

    /// Try to classify `asset`.
    async fn attempt(
        &self,
        asset: &Asset,
        cancel: CancellationToken,
    ) -> std::result::Result<Answer, StrategyError>;

    /// Can the backend be reached at all?
    async fn health_check(&self) -> std::result::Result<bool, StrategyError> {
        Ok(true)
    }
}
