//! Selective extraction
//!
//! Restoring a unit compares the archived manifest with a manifest built from
//! the restore destination, both keyed by archive path. Members whose local
//! copy already has the same size and hash are skipped; everything else is
//! unpacked. Without an archived manifest every member is extracted.

use crate::compression::open_container;
use crate::config::{ArchiveConfig, UnitPaths};
use crate::diff::restore_skip_set;
use crate::error::{ArchiveError, Result};
use crate::manifest::ManifestBuilder;
use crate::store::ManifestStore;
use crate::types::{ProgressCallback, ProgressInfo, RestoreReport, PROGRESS_INTERVAL};
use crate::utils::{format_bytes, normalize_member_name, throughput};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extracts containers back into their source trees
#[derive(Clone)]
pub struct ArchiveReader<'a> {
    config: &'a ArchiveConfig,
    threads: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ArchiveReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("dest_base", &self.config.dest_base)
            .field("threads", &self.threads)
            .finish()
    }
}

impl<'a> ArchiveReader<'a> {
    /// Create a reader using the configuration's effective thread count
    pub fn new(config: &'a ArchiveConfig) -> Self {
        Self {
            config,
            threads: config.effective_threads(),
            progress: None,
        }
    }

    /// Report hashing and extraction progress
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Restore one unit, skipping files that already match
    pub fn restore_unit(&self, unit: &UnitPaths) -> Result<RestoreReport> {
        info!("Archive source: {}", unit.container.display());
        info!("Archive destination: {}", unit.source.display());
        info!("Archived manifest file: {}", unit.manifest.display());
        info!("Unarchived manifest file: {}", unit.restored_manifest.display());

        let archived = ManifestStore::load(&unit.manifest);

        let unchanged = if archived.is_empty() {
            BTreeSet::new()
        } else {
            let mut builder = ManifestBuilder::new(self.threads);
            if let Some(ref callback) = self.progress {
                builder = builder.with_progress(callback.clone());
            }
            let local = builder.build_if_present(&unit.source_base, &unit.name, &unit.exclusions)?;
            restore_skip_set(&archived, &local)
        };
        info!("Unchanged files: {}", unchanged.len());

        let mut report = self.extract(&unit.container, &unit.source, &unchanged)?;
        report.unit = unit.name.clone();

        ManifestStore::save(&unit.restored_manifest, &archived)?;
        Ok(report)
    }

    /// Extract every member of `container` not named in `unchanged`
    ///
    /// Names in `unchanged` are archive paths (`/`-separated). When every
    /// member is unchanged nothing is written, not even the destination
    /// directory. Members that would land outside `destination` are refused.
    pub fn extract(
        &self,
        container: &Path,
        destination: &Path,
        unchanged: &BTreeSet<String>,
    ) -> Result<RestoreReport> {
        if !container.is_file() {
            return Err(ArchiveError::ArchiveNotFound(container.to_path_buf()));
        }
        let archive_size = fs::metadata(container)
            .map_err(|e| ArchiveError::io_at(container, e))?
            .len();

        let start = Instant::now();
        let mut archive = tar::Archive::new(open_container(container, self.threads)?);
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);

        let mut report = RestoreReport {
            archive_size,
            ..Default::default()
        };
        let mut destination_ready = destination.is_dir();

        let entries = archive
            .entries()
            .map_err(|e| ArchiveError::decompression(container, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveError::decompression(container, e))?;
            let name = {
                let path = entry
                    .path()
                    .map_err(|e| ArchiveError::decompression(container, e))?;
                normalize_member_name(&path.to_string_lossy())
            };
            report.members_total += 1;

            if unchanged.contains(&name) {
                report.members_skipped += 1;
                debug!("Unchanged, skipping {}", name);
                continue;
            }

            if !destination_ready {
                fs::create_dir_all(destination).map_err(|e| ArchiveError::io_at(destination, e))?;
                destination_ready = true;
            }

            // short or corrupt member data surfaces while unpacking
            let unpacked = entry.unpack_in(destination).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof | ErrorKind::InvalidData => {
                    ArchiveError::decompression(container, e)
                }
                _ => ArchiveError::io_at(destination.join(&name), e),
            })?;
            if !unpacked {
                warn!("Refusing to extract {} outside {}", name, destination.display());
                report.members_skipped += 1;
                continue;
            }
            report.members_extracted += 1;

            if report.members_extracted % PROGRESS_INTERVAL == 0 {
                info!("Progress: {} files extracted", report.members_extracted);
                if let Some(ref callback) = self.progress {
                    callback(ProgressInfo {
                        operation: "Extracting archive".to_string(),
                        current_item: Some(name.clone()),
                        processed: report.members_extracted,
                        total: None,
                        bytes_processed: 0,
                    });
                }
            }
        }

        report.duration = start.elapsed();
        let secs = report.duration.as_secs_f64();
        info!(
            "Files to unarchive pre-filtering: {}, after filtering out unchanged files: {}",
            report.members_total, report.members_extracted
        );
        info!(
            "Unarchived {} ({}) in {:.3}s ({}/s)",
            container.display(),
            format_bytes(archive_size),
            secs,
            format_bytes(throughput(archive_size, secs))
        );
        Ok(report)
    }
}
