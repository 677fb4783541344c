//! Version ledger: append-only, time-ordered record of accepted versions.
//!
//! Persisted as a JSON array and read/written wholesale. Callers are
//! responsible for appending monotonically increasing versions; the ledger
//! does not deduplicate. Two runs computing `next_version` concurrently
//! will collide, since nothing locks the file between read and write.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: u32,
    pub score: u32,
    /// SHA-256 hex digest of the version's archive.
    pub hash: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ledger file; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(&text).map_err(|source| CoreError::Ledger {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| CoreError::Ledger {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.entries.iter().map(|e| e.version).max()
    }

    /// 1 for an empty ledger, otherwise the highest recorded version + 1.
    pub fn next_version(&self) -> Result<u32, CoreError> {
        match self.latest_version() {
            None => Ok(1),
            Some(v) => v.checked_add(1).ok_or(CoreError::VersionOverflow(v)),
        }
    }

    pub fn append(&mut self, version: u32, score: u32, hash: impl Into<String>, time: DateTime<Utc>) {
        self.entries.push(LedgerEntry {
            version,
            score,
            hash: hash.into(),
            time,
        });
    }

    /// Remove every entry with `version >= threshold`; returns how many
    /// were removed.
    pub fn truncate_from(&mut self, threshold: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.version < threshold);
        before - self.entries.len()
    }

    /// Most recent entry recorded for `version`.
    pub fn get(&self, version: u32) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| e.version == version)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_empty() {
        assert_eq!(Ledger::new().next_version().unwrap(), 1);
    }

    #[test]
    fn test_next_version_after_append_ignores_score_and_hash() {
        let mut ledger = Ledger::new();
        for (n, score, hash) in [(1, 90, "aa"), (2, 0, ""), (3, 55, "ff")] {
            ledger.append(n, score, hash, Utc::now());
            assert_eq!(ledger.next_version().unwrap(), n + 1);
        }
    }

    #[test]
    fn test_next_version_at_limit() {
        let mut ledger = Ledger::new();
        ledger.append(u32::MAX, 50, "h", Utc::now());
        assert!(matches!(ledger.next_version(), Err(CoreError::VersionOverflow(u32::MAX))));
    }

    #[test]
    fn test_truncate_from() {
        let mut ledger = Ledger::new();
        for n in 1..=6 {
            ledger.append(n, 50, format!("{:064}", n), Utc::now());
        }
        assert_eq!(ledger.truncate_from(4), 3);
        assert_eq!(ledger.next_version().unwrap(), 4);
        assert_eq!(ledger.truncate_from(10), 0);
        assert_eq!(ledger.truncate_from(1), 3);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("versions.json");
        let mut ledger = Ledger::new();
        ledger.append(1, 72, "abc", Utc::now());
        ledger.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('['));
        assert!(text.contains("\"hash\""));

        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get(1).map(|e| e.score), Some(72));
    }

    #[test]
    fn test_load_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Ledger::load(&dir.path().join("none.json")).unwrap().is_empty());
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "").unwrap();
        assert!(Ledger::load(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_load_original_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(
            &path,
            r#"[{"version": 3, "score": 81, "hash": "deadbeef", "time": "2024-05-01T10:00:00.123456+00:00"}]"#,
        )
        .unwrap();
        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.next_version().unwrap(), 4);
    }
}
