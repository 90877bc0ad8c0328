//! Multi-part archive filename grammar.
//!
//! Cloud-storage providers split large folder downloads into several ZIP
//! files named `<folder>-<timestamp>-<total>-<part>.zip`, e.g.
//! `ROAD TO EWC-20260205T124843Z-3-001.zip`. Every part of one logical
//! archive shares the `<folder>-<timestamp>-<total>` prefix, which becomes
//! the group key.
//!
//! Parsing is pure. Names that do not follow the convention are not errors:
//! most filesystem events are not fragments at all, so they yield `None`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static FRAGMENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<folder>.+)-(?P<timestamp>\d{8}T\d{6}Z)-(?P<total>\d+)-(?P<part>\d{3})\.zip$",
    )
    .expect("fragment grammar is a valid regex")
});

/// One accepted fragment filename. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    /// `<folder>-<timestamp>-<total>`, shared by every part of the archive.
    pub group_key: String,

    /// Folder name the provider zipped (may contain spaces and hyphens).
    pub folder_name: String,

    /// The `YYYYMMDDTHHMMSSZ` token.
    pub timestamp: String,

    /// Declared number of parts (≥ 1).
    pub declared_total_parts: u32,

    /// This fragment's 1-indexed part number.
    pub part_number: u32,

    /// Where the fragment was observed.
    pub source_path: PathBuf,
}

/// Parse a bare file name. `source_path` is taken to be the name itself.
pub fn parse_fragment(file_name: &str) -> Option<FragmentDescriptor> {
    parse_with_source(file_name, PathBuf::from(file_name))
}

/// Parse the file-name component of `path`.
pub fn parse_fragment_path(path: &Path) -> Option<FragmentDescriptor> {
    let name = path.file_name()?.to_str()?;
    parse_with_source(name, path.to_path_buf())
}

fn parse_with_source(file_name: &str, source_path: PathBuf) -> Option<FragmentDescriptor> {
    let caps = FRAGMENT_NAME.captures(file_name)?;

    // Overflowing or zero counters are a non-match, never a fake "0 of 0" group.
    let declared_total_parts: u32 = caps["total"].parse().ok().filter(|n| *n > 0)?;
    let part_number: u32 = caps["part"].parse().ok().filter(|n| *n > 0)?;

    let folder_name = caps["folder"].to_string();
    let timestamp = caps["timestamp"].to_string();
    let group_key = format!("{folder_name}-{timestamp}-{}", &caps["total"]);

    Some(FragmentDescriptor {
        group_key,
        folder_name,
        timestamp,
        declared_total_parts,
        part_number,
        source_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_example() {
        let d = parse_fragment("ROAD TO EWC-20260205T124843Z-3-001.zip").unwrap();
        assert_eq!(d.group_key, "ROAD TO EWC-20260205T124843Z-3");
        assert_eq!(d.folder_name, "ROAD TO EWC");
        assert_eq!(d.timestamp, "20260205T124843Z");
        assert_eq!(d.declared_total_parts, 3);
        assert_eq!(d.part_number, 1);
    }

    #[test]
    fn every_part_shares_the_group_key() {
        let keys: Vec<String> = (1..=3)
            .map(|i| format!("ROAD TO EWC-20260205T124843Z-3-{i:03}.zip"))
            .map(|name| parse_fragment(&name).unwrap().group_key)
            .collect();
        assert!(keys.iter().all(|k| k == "ROAD TO EWC-20260205T124843Z-3"));
    }

    #[test]
    fn folder_name_may_contain_hyphens() {
        let d = parse_fragment("B-Roll - Day 2-20251111T080000Z-12-010.zip").unwrap();
        assert_eq!(d.folder_name, "B-Roll - Day 2");
        assert_eq!(d.declared_total_parts, 12);
        assert_eq!(d.part_number, 10);
        assert_eq!(d.group_key, "B-Roll - Day 2-20251111T080000Z-12");
    }

    #[test]
    fn rejects_non_fragments() {
        for name in [
            "song.mp3",
            "archive.zip",
            "ROAD TO EWC-20260205T124843Z-3-1.zip",
            "ROAD TO EWC-20260205T124843Z-3-0001.zip",
            "ROAD TO EWC-20260205T124843-3-001.zip",
            "ROAD TO EWC-2026020T124843Z-3-001.zip",
            "ROAD TO EWC-20260205T124843Z-3-001.zip.crdownload",
            "ROAD TO EWC-20260205T124843Z--001.zip",
            "-20260205T124843Z-3-001.zip",
            "ROAD TO EWC-20260205T124843Z-3-001.ZIP",
        ] {
            assert!(parse_fragment(name).is_none(), "{name} should be rejected");
        }
    }

    #[test]
    fn zero_counters_are_rejected() {
        assert!(parse_fragment("Pack-20260205T124843Z-0-001.zip").is_none());
        assert!(parse_fragment("Pack-20260205T124843Z-3-000.zip").is_none());
    }

    #[test]
    fn overflowing_total_is_rejected() {
        assert!(parse_fragment("Pack-20260205T124843Z-99999999999-001.zip").is_none());
    }

    #[test]
    fn parses_from_full_path() {
        let path = Path::new("/home/me/Downloads/Pack-20260205T124843Z-2-002.zip");
        let d = parse_fragment_path(path).unwrap();
        assert_eq!(d.part_number, 2);
        assert_eq!(d.source_path, path);
    }

    #[test]
    fn grammar_applies_to_file_name_only() {
        let path = Path::new("/tmp/Pack-20260205T124843Z-2-002.zip/inner.txt");
        assert!(parse_fragment_path(path).is_none());
    }
}
