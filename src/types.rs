//! Core data types used throughout savearc
//!
//! ## Overview
//!
//! - **Manifest state**: `ManifestEntry`, `Manifest` - files and their fingerprints
//! - **Change detection**: `DiffResult` - changed/unchanged partition of a manifest
//! - **Outcomes**: `ArchiveReport`, `RestoreReport` - per archival unit results
//! - **Progress**: `ProgressInfo`, `ProgressCallback` - coarse progress reporting
//!
//! ## Examples
//!
//! ```rust
//! use savearc::types::{Manifest, ManifestEntry};
//! use std::path::PathBuf;
//!
//! let mut manifest = Manifest::new();
//! manifest.insert(
//!     "/saves/game/slot1.sav".to_string(),
//!     ManifestEntry {
//!         source_path: PathBuf::from("/saves/game/slot1.sav"),
//!         archive_path: "slot1.sav".to_string(),
//!         size: 1024,
//!         content_hash: "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
//!     },
//! );
//! assert_eq!(manifest.total_size(), 1024);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One tracked file
///
/// The serialized field names (`filename`, `arcfile`, `size`, `sha1sum`) are the
/// manifest document format shared with previously written manifests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Absolute path of the file on the machine that built the manifest
    #[serde(rename = "filename")]
    pub source_path: PathBuf,
    /// Path relative to the archival unit root, `/`-separated, no leading separator
    #[serde(rename = "arcfile")]
    pub archive_path: String,
    /// File size in bytes
    pub size: u64,
    /// Hex SHA-1 of the file content, empty until hashed
    #[serde(rename = "sha1sum", default)]
    pub content_hash: String,
}

impl ManifestEntry {
    /// Whether two entries describe the same content
    ///
    /// Only size and hash take part; paths may legitimately differ between the
    /// machine that archived and the machine that restores.
    pub fn same_content(&self, other: &ManifestEntry) -> bool {
        self.size == other.size && self.content_hash == other.content_hash
    }
}

/// Mapping from a stable key to a [`ManifestEntry`]
///
/// Keys are the source path while building and the archive path for
/// restore-side comparisons. Iteration and serialization are always in key
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry under the same key
    pub fn insert(&mut self, key: String, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(key, entry)
    }

    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, entry)` pairs in key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, ManifestEntry> {
        self.entries.iter()
    }

    /// Iterate over entries in key order
    pub fn values(&self) -> btree_map::Values<'_, String, ManifestEntry> {
        self.entries.values()
    }

    /// Sum of all entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Re-key the manifest by archive path
    ///
    /// Used on the restore side, where the archived manifest was keyed by paths
    /// on a different machine.
    pub fn rekey_by_archive_path(&self) -> Manifest {
        self.entries
            .values()
            .map(|e| (e.archive_path.clone(), e.clone()))
            .collect()
    }

    /// Archive paths of all entries
    pub fn archive_paths(&self) -> BTreeSet<String> {
        self.entries.values().map(|e| e.archive_path.clone()).collect()
    }
}

impl FromIterator<(String, ManifestEntry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, ManifestEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a ManifestEntry);
    type IntoIter = btree_map::Iter<'a, String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Partition of a new manifest against an old one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Entries absent from the old manifest or differing in size or hash
    pub changed: Manifest,
    /// Entries whose size and hash both match the old manifest
    pub unchanged: Manifest,
}

impl DiffResult {
    /// Whether anything needs to be written
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Archive paths of the unchanged entries
    pub fn unchanged_archive_paths(&self) -> BTreeSet<String> {
        self.unchanged.archive_paths()
    }
}

/// Outcome of archiving one unit
#[derive(Debug, Clone, Default)]
pub struct ArchiveReport {
    /// Name of the archival unit (the source subdirectory)
    pub unit: String,
    /// Files in the freshly built manifest
    pub files_scanned: usize,
    /// Files written to the container
    pub files_archived: usize,
    /// Uncompressed bytes of archived file content
    pub bytes_archived: u64,
    /// Size of the compressed container
    pub compressed_size: u64,
    /// True when nothing changed and no container was written
    pub skipped: bool,
    /// Wall time for the unit
    pub duration: Duration,
}

/// Outcome of restoring one unit
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Name of the archival unit
    pub unit: String,
    /// Members in the container
    pub members_total: usize,
    /// Members written to disk
    pub members_extracted: usize,
    /// Members skipped because the local copy already matches
    pub members_skipped: usize,
    /// Size of the compressed container
    pub archive_size: u64,
    /// Wall time for the unit
    pub duration: Duration,
}

/// Number of files between coarse progress reports
pub const PROGRESS_INTERVAL: usize = 100;

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
