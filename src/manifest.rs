//! Manifest building
//!
//! Walks an archival unit, skips excluded directories, and fingerprints every
//! regular file.
//!
//! ## Phases
//!
//! 1. **Walk** (single thread): `walkdir` traversal in file-name order. Each
//!    directory is checked against the [`ExclusionSet`] once; excluded
//!    directories are not descended into. Every regular file yields an entry
//!    with its size and an empty hash.
//! 2. **Hash** (bounded pool): the entries are hashed on a rayon pool of the
//!    configured size. Each task owns exactly one entry. The call returns only
//!    when every hash is done, and the first read failure fails the whole
//!    build.
//!
//! Symbolic links are neither followed nor recorded.
//!
//! ## Example
//!
//! ```rust,no_run
//! use savearc::exclusion::ExclusionSet;
//! use savearc::manifest::ManifestBuilder;
//! use std::path::Path;
//!
//! # fn main() -> savearc::Result<()> {
//! let builder = ManifestBuilder::new(4);
//! let manifest = builder.build(Path::new("/saves"), "slot1", &ExclusionSet::new(["cache"]))?;
//! println!("{} files, {} bytes", manifest.len(), manifest.total_size());
//! # Ok(())
//! # }
//! ```

use crate::error::{ArchiveError, Result};
use crate::exclusion::ExclusionSet;
use crate::types::{Manifest, ManifestEntry, ProgressCallback, ProgressInfo, PROGRESS_INTERVAL};
use crate::utils::{hash_file_content, to_archive_path};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Builds manifests for archival units
#[derive(Clone)]
pub struct ManifestBuilder {
    threads: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("threads", &self.threads)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ManifestBuilder {
    /// Create a builder hashing on `threads` workers (minimum 1)
    ///
    /// The count is used as given; callers clamp it to the machine with
    /// [`ArchiveConfig::effective_threads`](crate::config::ArchiveConfig::effective_threads).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            progress: None,
        }
    }

    /// Report hashing progress every [`PROGRESS_INTERVAL`] files
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Number of hashing workers
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Build the manifest for `root/subdir`, keyed by source path
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::SourceNotFound`] if `root/subdir` is not a directory
    /// - [`ArchiveError::WalkDir`] if traversal fails
    /// - [`ArchiveError::PathIo`] naming the first file that could not be hashed
    pub fn build(&self, root: &Path, subdir: &str, exclusions: &ExclusionSet) -> Result<Manifest> {
        let unit_root = root.join(subdir);
        if !unit_root.is_dir() {
            return Err(ArchiveError::SourceNotFound(unit_root));
        }

        let start = Instant::now();
        let mut entries = walk_unit(&unit_root, exclusions)?;
        let walked = start.elapsed();
        debug!("Walked {:?}: {} files in {:?}", unit_root, entries.len(), walked);

        self.hash_entries(&mut entries)?;
        debug!(
            "Hashed {} files on {} workers in {:?}",
            entries.len(),
            self.threads,
            start.elapsed() - walked
        );

        entries
            .into_iter()
            .map(|e| {
                let key = e
                    .source_path
                    .to_str()
                    .ok_or_else(|| ArchiveError::NonUtf8Path(e.source_path.clone()))?
                    .to_owned();
                Ok((key, e))
            })
            .collect()
    }

    /// Like [`build`](Self::build), but a missing directory yields an empty manifest
    ///
    /// Used before a restore, when nothing may exist locally yet.
    pub fn build_if_present(
        &self,
        root: &Path,
        subdir: &str,
        exclusions: &ExclusionSet,
    ) -> Result<Manifest> {
        if !root.join(subdir).is_dir() {
            debug!("{:?} does not exist yet, nothing on disk", root.join(subdir));
            return Ok(Manifest::new());
        }
        self.build(root, subdir, exclusions)
    }

    fn hash_entries(&self, entries: &mut [ManifestEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("savearc-hash-{}", i))
            .build()?;

        let total = entries.len();
        let processed = AtomicUsize::new(0);
        let bytes = AtomicU64::new(0);

        pool.install(|| {
            entries.par_iter_mut().try_for_each(|entry| -> Result<()> {
                entry.content_hash = hash_file_content(&entry.source_path)?;
                trace!("{} {}", entry.content_hash, entry.archive_path);

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                let done_bytes = bytes.fetch_add(entry.size, Ordering::Relaxed) + entry.size;
                if done % PROGRESS_INTERVAL == 0 || done == total {
                    if let Some(ref callback) = self.progress {
                        callback(ProgressInfo {
                            operation: "Hashing files".to_string(),
                            current_item: Some(entry.archive_path.clone()),
                            processed: done,
                            total: Some(total),
                            bytes_processed: done_bytes,
                        });
                    }
                }
                Ok(())
            })
        })
    }
}

/// Single-threaded walk producing unhashed entries in path order
fn walk_unit(unit_root: &Path, exclusions: &ExclusionSet) -> Result<Vec<ManifestEntry>> {
    let walker = WalkDir::new(unit_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() {
                return true;
            }
            let relative = e.path().strip_prefix(unit_root).unwrap_or(e.path());
            let excluded = exclusions.is_excluded(relative);
            if excluded {
                debug!("Excluding directory {:?}", e.path());
            }
            !excluded
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata()?.len();
        // manifest keys and member names are UTF-8; lossy names could collide
        if entry.path().to_str().is_none() {
            return Err(ArchiveError::NonUtf8Path(entry.path().to_path_buf()));
        }
        let relative = entry.path().strip_prefix(unit_root).map_err(|_| {
            ArchiveError::internal(format!("{:?} is outside {:?}", entry.path(), unit_root))
        })?;

        entries.push(ManifestEntry {
            source_path: entry.path().to_path_buf(),
            archive_path: to_archive_path(relative)?,
            size,
            content_hash: String::new(),
        });
    }
    Ok(entries)
}
