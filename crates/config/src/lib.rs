//! Configuration loading, validation, and management for dropsort.
//!
//! Loads configuration from `~/.dropsort/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use dropsort_core::Confidence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.dropsort/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Downloads folder watching
    #[serde(default)]
    pub watch: WatchConfig,

    /// Fragment grouping and sweeping
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Archive extraction
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Destination project routing
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Classification strategy chain
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// Analytics events
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    #[serde(default)]
    pub recursive: bool,

    /// Quiet period before a created/modified path is ingested
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Re-ingest fragment files already present at startup
    #[serde(default = "default_true")]
    pub scan_on_start: bool,
}

fn default_downloads_dir() -> PathBuf {
    dirs_home().join("Downloads")
}
fn default_debounce_ms() -> u64 {
    250
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            recursive: false,
            debounce_ms: default_debounce_ms(),
            scan_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Idle time after which an incomplete group is abandoned
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Delete the fragment files of abandoned groups
    #[serde(default)]
    pub delete_abandoned_fragments: bool,
}

fn default_sweep_interval() -> u64 {
    30
}
fn default_stale_after() -> u64 {
    2 * 60 * 60
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
            delete_abandoned_fragments: false,
        }
    }
}

impl GroupingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Defaults to `<downloads_dir>/dropsort-extracted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_unzip_command")]
    pub unzip_command: String,

    /// Remove fragment files once every part extracted cleanly
    #[serde(default)]
    pub delete_fragments_after: bool,
}

fn default_unzip_command() -> String {
    "unzip".into()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            unzip_command: default_unzip_command(),
            delete_fragments_after: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Destination project root. Without it results are only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<PathBuf>,

    /// Move instead of copy
    #[serde(default)]
    pub move_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Attempt model-based (mood/genre style) classification at all
    #[serde(default = "default_true")]
    pub mood_classification: bool,

    #[serde(default)]
    pub local_model: bool,

    #[serde(default)]
    pub remote_api: bool,

    #[serde(default)]
    pub web_lookup: bool,

    /// Minimum confidence that stops the chain
    #[serde(default = "default_min_confidence")]
    pub min_confidence: String,

    #[serde(default = "default_strategy_timeout")]
    pub strategy_timeout_secs: u64,

    #[serde(default = "default_total_budget")]
    pub total_budget_secs: u64,

    /// Simultaneous classification requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default)]
    pub local: LocalModelConfig,

    #[serde(default)]
    pub remote: RemoteApiConfig,

    #[serde(default)]
    pub web: WebLookupConfig,
}

fn default_min_confidence() -> String {
    "medium".into()
}
fn default_strategy_timeout() -> u64 {
    20
}
fn default_total_budget() -> u64 {
    60
}
fn default_max_concurrent() -> usize {
    4
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            mood_classification: true,
            local_model: false,
            remote_api: false,
            web_lookup: false,
            min_confidence: default_min_confidence(),
            strategy_timeout_secs: default_strategy_timeout(),
            total_budget_secs: default_total_budget(),
            max_concurrent: default_max_concurrent(),
            local: LocalModelConfig::default(),
            remote: RemoteApiConfig::default(),
            web: WebLookupConfig::default(),
        }
    }
}

impl ClassificationConfig {
    /// Parsed minimum confidence. `validate()` guarantees this parses for
    /// loaded configs; anything else falls back to `Medium`.
    pub fn min_confidence(&self) -> Confidence {
        self.min_confidence.parse().unwrap_or(Confidence::Medium)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_secs(self.total_budget_secs)
    }
}

/// Local OpenAI-compatible inference server (Ollama, llama.cpp, vLLM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    #[serde(default = "default_local_url")]
    pub api_url: String,

    #[serde(default = "default_local_model")]
    pub model: String,
}

fn default_local_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_local_model() -> String {
    "llama3.2".into()
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_local_url(),
            model: default_local_model(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteApiConfig {
    #[serde(default = "default_remote_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_remote_model")]
    pub model: String,
}

fn default_remote_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_remote_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_remote_url(),
            api_key: None,
            model: default_remote_model(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for RemoteApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApiConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebLookupConfig {
    /// Search page URL; `{query}` is replaced with the encoded asset name.
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// Prefer the group's origin URL over a search when one is known
    #[serde(default = "default_true")]
    pub use_origin_hint: bool,
}

fn default_lookup_url() -> String {
    "https://duckduckgo.com/html/?q={query}".into()
}

impl Default for WebLookupConfig {
    fn default() -> Self {
        Self {
            lookup_url: default_lookup_url(),
            use_origin_hint: true,
        }
    }
}

/// Analytics event delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Append events as JSON lines to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<PathBuf>,

    /// POST events to this collector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en-US".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_path: None,
            endpoint: None,
            locale: default_locale(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.dropsort/config.toml),
    /// or from `DROPSORT_CONFIG` when set.
    ///
    /// Environment overrides:
    /// - `DROPSORT_DOWNLOADS_DIR`
    /// - `DROPSORT_MIN_CONFIDENCE`
    /// - `DROPSORT_API_KEY`, then `OPENAI_API_KEY`, then `OPENROUTER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DROPSORT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env("DROPSORT_DOWNLOADS_DIR") {
            self.watch.downloads_dir = PathBuf::from(dir);
        }

        if let Some(level) = env("DROPSORT_MIN_CONFIDENCE") {
            self.classification.min_confidence = level;
        }

        if self.classification.remote.api_key.is_none() {
            self.classification.remote.api_key = env("DROPSORT_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or_else(|| env("OPENROUTER_API_KEY"));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".dropsort")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where extracted archives land.
    pub fn extraction_dir(&self) -> PathBuf {
        self.extraction
            .output_dir
            .clone()
            .unwrap_or_else(|| self.watch.downloads_dir.join("dropsort-extracted"))
    }

    /// Ledger of archives already extracted, kept next to the extracted
    /// output.
    pub fn ledger_path(&self) -> PathBuf {
        self.extraction_dir().join(".dropsort-completed.jsonl")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grouping.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "grouping.sweep_interval_secs must be > 0".into(),
            ));
        }

        if self.grouping.stale_after_secs == 0 {
            return Err(ConfigError::ValidationError(
                "grouping.stale_after_secs must be > 0".into(),
            ));
        }

        let c = &self.classification;
        if c.total_budget_secs == 0 || c.strategy_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "classification timeouts must be > 0".into(),
            ));
        }

        if c.strategy_timeout_secs > c.total_budget_secs {
            return Err(ConfigError::ValidationError(
                "classification.strategy_timeout_secs cannot exceed total_budget_secs".into(),
            ));
        }

        if c.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "classification.max_concurrent must be > 0".into(),
            ));
        }

        c.min_confidence
            .parse::<Confidence>()
            .map_err(ConfigError::ValidationError)?;

        if c.web_lookup && !c.web.lookup_url.contains("{query}") {
            return Err(ConfigError::ValidationError(
                "classification.web.lookup_url must contain {query}".into(),
            ));
        }

        Ok(())
    }

    /// Names of the model-based strategies the chain will attempt.
    pub fn enabled_strategies(&self) -> Vec<&'static str> {
        let c = &self.classification;
        if !c.mood_classification {
            return Vec::new();
        }
        let mut names = Vec::new();
        if c.local_model {
            names.push("local_model");
        }
        // Without a key the remote strategy is never built
        if c.remote_api && c.remote.api_key.is_some() {
            names.push("remote_llm");
        }
        if c.web_lookup {
            names.push("web_lookup");
        }
        names
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
