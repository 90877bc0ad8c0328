//! Error types for the dropsort domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for dropsort operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Extraction ---
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // --- Routing ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Persistence ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Why a classification strategy declined to answer.
///
/// None of these are fatal: the orchestrator treats every variant as a
/// decline and moves on to the next strategy in the chain.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("Strategy not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Ambiguous answer: {0}")]
    Ambiguous(String),

    #[error("Timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl StrategyError {
    /// Short machine-readable reason, used as an analytics field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::RateLimited { .. } => "rate_limited",
            Self::Ambiguous(_) => "ambiguous",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Fragment missing on disk: {0}")]
    MissingFragment(PathBuf),

    #[error("Extractor command failed for {archive}: {reason}")]
    CommandFailed { archive: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Destination not configured")]
    NotConfigured,

    #[error("Failed to route {asset} to {destination}: {reason}")]
    TransferFailed {
        asset: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_error_displays_correctly() {
        let err = StrategyError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn context_errors_convert_into_top_level() {
        let err: Error = ExtractionError::MissingFragment(PathBuf::from("/dl/a-001.zip")).into();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(err.to_string().contains("a-001.zip"));

        let err: Error = std::io::Error::other("disk full").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn strategy_error_kinds_are_stable() {
        assert_eq!(StrategyError::TimedOut { timeout_ms: 10 }.kind(), "timed_out");
        assert_eq!(StrategyError::Network("down".into()).kind(), "network");
        assert_eq!(StrategyError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn routing_error_displays_paths() {
        let err = RoutingError::TransferFailed {
            asset: PathBuf::from("/tmp/a.wav"),
            destination: PathBuf::from("/proj/Music"),
            reason: "disk full".into(),
        };
        let text = err.to_string();
        assert!(text.contains("a.wav"));
        assert!(text.contains("disk full"));
    }
}
