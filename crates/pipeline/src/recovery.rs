//! Startup recovery scan.
//!
//! Fragments left in the downloads folder by a previous run (or downloaded
//! while dropsort was not running) are found here and re-ingested with their
//! modification time as arrival time. Live groups can still complete; stale
//! ones get reaped by the next sweep.

use chrono::{DateTime, Utc};
use dropsort_core::fragment::{FragmentDescriptor, parse_fragment_path};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A fragment found on disk.
#[derive(Debug, Clone)]
pub struct FoundFragment {
    pub descriptor: FragmentDescriptor,
    pub modified_at: DateTime<Utc>,
}

/// Fragment files under `dir`, oldest first.
pub fn scan_fragments(dir: &Path, recursive: bool) -> Vec<FoundFragment> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut found: Vec<FoundFragment> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during scan");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let descriptor = parse_fragment_path(e.path())?;
            let modified_at = e
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            Some(FoundFragment {
                descriptor,
                modified_at,
            })
        })
        .collect();

    found.sort_by_key(|f| f.modified_at);
    debug!(dir = %dir.display(), count = found.len(), "Fragment scan finished");
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_fragments() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "ROAD TO EWC-20260205T124843Z-3-001.zip",
            "ROAD TO EWC-20260205T124843Z-3-002.zip",
            "ROAD TO EWC-20260205T124843Z-3-003.zip.crdownload",
            "holiday.zip",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let found = scan_fragments(dir.path(), false);
        assert_eq!(found.len(), 2);
        assert!(found
            .iter()
            .all(|f| f.descriptor.group_key == "ROAD TO EWC-20260205T124843Z-3"));
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("Pack-20260205T124843Z-2-001.zip"), b"x").unwrap();

        assert!(scan_fragments(dir.path(), false).is_empty());
        assert_eq!(scan_fragments(dir.path(), true).len(), 1);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        assert!(scan_fragments(Path::new("/definitely/not/here"), true).is_empty());
    }
}
