//! Fragment group outcomes shared between the registry, the sweeper and the
//! extraction collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to a group when a fragment was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// First fragment for this key; the group is still missing parts.
    Created,
    /// Known group, still missing parts (duplicates land here too).
    UpdatedIncomplete,
    /// This fragment completed the group. Reported exactly once per group.
    BecameComplete,
    /// The group had already completed; nothing new to do.
    AlreadyCompleteDuplicate,
}

impl GroupStatus {
    /// Whether the caller observed the single complete transition.
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::BecameComplete)
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::UpdatedIncomplete => write!(f, "updated_incomplete"),
            Self::BecameComplete => write!(f, "became_complete"),
            Self::AlreadyCompleteDuplicate => write!(f, "already_complete_duplicate"),
        }
    }
}

/// A complete logical archive, removed from the registry and ready for
/// extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedGroup {
    pub group_key: String,
    pub folder_name: String,
    pub expected_parts: u32,
    /// `(part number, path)` in ascending part order.
    pub parts: Vec<(u32, PathBuf)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_hint: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CompletedGroup {
    /// Fragment paths in part order.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.parts.iter().map(|(_, p)| p)
    }

    /// Milliseconds between the first fragment and completion.
    pub fn assembly_ms(&self) -> u64 {
        self.completed_at
            .signed_duration_since(self.first_seen_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// A group that went idle past the staleness threshold without completing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonedGroup {
    pub group_key: String,
    pub folder_name: String,
    pub expected_parts: u32,
    /// `(part number, path)` of what did arrive.
    pub received: Vec<(u32, PathBuf)>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl AbandonedGroup {
    /// Part numbers in `1..=expected_parts` that never arrived.
    pub fn missing_parts(&self) -> Vec<u32> {
        (1..=self.expected_parts)
            .filter(|n| !self.received.iter().any(|(p, _)| p == n))
            .collect()
    }
}
