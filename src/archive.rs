//! Archive writing
//!
//! [`ArchiveWriter::archive_unit`] runs the whole archive path for one unit:
//!
//! 1. build the current manifest ([`ManifestBuilder`])
//! 2. load the previous one ([`ManifestStore`]) and diff
//! 3. stop if nothing changed; no temporary container is created and the
//!    destination is not touched
//! 4. write the changed files into a temporary tar in `temp_dir`, in archive
//!    path order
//! 5. compress the tar with [`BlockGzEncoder`] into a staging file next to the
//!    destination and rename it into place
//! 6. delete the temporary tar and persist the full new manifest
//!
//! A failure at any step leaves the previous container and manifest as they
//! were; the temporary tar and staging file are removed when dropped.

use crate::compression::{choose_block_size, BlockGzEncoder, CompressionStats};
use crate::config::{ArchiveConfig, UnitPaths};
use crate::diff::compute_diff;
use crate::error::{ArchiveError, Result};
use crate::manifest::ManifestBuilder;
use crate::store::ManifestStore;
use crate::types::{
    ArchiveReport, Manifest, ManifestEntry, ProgressCallback, ProgressInfo, PROGRESS_INTERVAL,
};
use crate::utils::{format_bytes, persist_staged, staging_file_for, throughput};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;
use tar::HeaderMode;
use tracing::{debug, info};

/// Result of writing one container
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    /// Members written
    pub files: usize,
    /// Size of the uncompressed tar
    pub tar_bytes: u64,
    /// Compression pass statistics
    pub compression: CompressionStats,
}

/// Writes incremental containers for archival units
#[derive(Clone)]
pub struct ArchiveWriter<'a> {
    config: &'a ArchiveConfig,
    threads: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ArchiveWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("temp_dir", &self.config.temp_dir)
            .field("threads", &self.threads)
            .finish()
    }
}

impl<'a> ArchiveWriter<'a> {
    /// Create a writer using the configuration's effective thread count
    pub fn new(config: &'a ArchiveConfig) -> Self {
        Self {
            config,
            threads: config.effective_threads(),
            progress: None,
        }
    }

    /// Report hashing and tar progress
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Archive one unit if anything in it changed
    pub fn archive_unit(&self, unit: &UnitPaths) -> Result<ArchiveReport> {
        let start = Instant::now();
        info!("Archive source: {}", unit.source.display());
        info!("Archive destination: {}", unit.container.display());
        info!("Manifest file: {}", unit.manifest.display());

        let mut builder = ManifestBuilder::new(self.threads);
        if let Some(ref callback) = self.progress {
            builder = builder.with_progress(callback.clone());
        }
        let manifest = builder.build(&unit.source_base, &unit.name, &unit.exclusions)?;
        info!(
            "Files to archive: {} ({})",
            manifest.len(),
            format_bytes(manifest.total_size())
        );

        let previous = ManifestStore::load(&unit.manifest);
        let diff = compute_diff(&previous, &manifest);

        let mut report = ArchiveReport {
            unit: unit.name.clone(),
            files_scanned: manifest.len(),
            ..Default::default()
        };

        if !diff.has_changes() {
            info!("Manifest matches what exists, skipping.");
            report.skipped = true;
            report.duration = start.elapsed();
            return Ok(report);
        }

        report.bytes_archived = diff.changed.total_size();
        info!(
            "Files to archive (changed files only): {} ({})",
            diff.changed.len(),
            format_bytes(report.bytes_archived)
        );

        let stats = self.write_container(&diff.changed, &unit.name, &unit.container)?;
        ManifestStore::save(&unit.manifest, &manifest)?;

        report.files_archived = stats.files;
        report.compressed_size = stats.compression.bytes_out;
        report.duration = start.elapsed();
        Ok(report)
    }

    /// Write `changed` as a compressed container at `destination`
    ///
    /// The destination is replaced only after the full compressed stream has
    /// been written.
    pub fn write_container(
        &self,
        changed: &Manifest,
        unit_name: &str,
        destination: &Path,
    ) -> Result<ContainerStats> {
        fs::create_dir_all(&self.config.temp_dir)
            .map_err(|e| ArchiveError::io_at(&self.config.temp_dir, e))?;
        let mut tar_file = tempfile::Builder::new()
            .prefix(&format!("{}.", unit_name))
            .suffix(".tar")
            .tempfile_in(&self.config.temp_dir)
            .map_err(|e| ArchiveError::io_at(&self.config.temp_dir, e))?;
        let tar_path = tar_file.path().to_path_buf();
        info!("Temporary archive (uncompressed): {}", tar_path.display());

        let tar_start = Instant::now();
        let files = self.write_tar(changed, tar_file.as_file(), &tar_path)?;
        let tar_bytes = tar_file
            .as_file()
            .metadata()
            .map_err(|e| ArchiveError::io_at(&tar_path, e))?
            .len();
        let tar_secs = tar_start.elapsed().as_secs_f64();
        info!(
            "Archived {} files ({}) in {:.3}s: {}/s",
            files,
            format_bytes(tar_bytes),
            tar_secs,
            format_bytes(throughput(tar_bytes, tar_secs))
        );

        tar_file
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|e| ArchiveError::io_at(&tar_path, e))?;
        let compression = self.compress_into(tar_file.as_file(), tar_bytes, destination)?;

        // removes the temporary tar
        tar_file.close().map_err(|e| ArchiveError::io_at(&tar_path, e))?;

        Ok(ContainerStats {
            files,
            tar_bytes,
            compression,
        })
    }

    fn write_tar(&self, changed: &Manifest, file: &File, tar_path: &Path) -> Result<usize> {
        let mut entries: Vec<&ManifestEntry> = changed.values().collect();
        entries.sort_by(|a, b| a.archive_path.cmp(&b.archive_path));
        let total = entries.len();

        let mut builder = tar::Builder::new(BufWriter::new(file));
        builder.mode(HeaderMode::Complete);
        builder.follow_symlinks(false);

        let mut bytes = 0u64;
        for (index, entry) in entries.iter().enumerate() {
            builder
                .append_path_with_name(&entry.source_path, &entry.archive_path)
                .map_err(|e| ArchiveError::io_at(&entry.source_path, e))?;
            bytes += entry.size;

            let done = index + 1;
            if done % PROGRESS_INTERVAL == 0 {
                info!("Progress: {}/{} files written", done, total);
                if let Some(ref callback) = self.progress {
                    callback(ProgressInfo {
                        operation: "Writing archive".to_string(),
                        current_item: Some(entry.archive_path.clone()),
                        processed: done,
                        total: Some(total),
                        bytes_processed: bytes,
                    });
                }
            }
        }

        let mut writer = builder
            .into_inner()
            .map_err(|e| ArchiveError::io_at(tar_path, e))?;
        writer.flush().map_err(|e| ArchiveError::io_at(tar_path, e))?;
        Ok(total)
    }

    fn compress_into(
        &self,
        tar: &File,
        tar_bytes: u64,
        destination: &Path,
    ) -> Result<CompressionStats> {
        let block_size = choose_block_size(tar_bytes, self.threads);
        info!(
            "Compressing ({} threads, blocksize {}) to {}",
            self.threads,
            format_bytes(block_size as u64),
            destination.display()
        );

        let staged = staging_file_for(destination)?;
        let start = Instant::now();
        let stats = {
            let mut encoder =
                BlockGzEncoder::new(BufWriter::new(staged.as_file()), self.threads, block_size)?;
            std::io::copy(&mut BufReader::new(tar), &mut encoder)
                .map_err(|e| {
                    ArchiveError::compression(format!("{}: {}", destination.display(), e))
                })?;
            let (writer, stats) = encoder.finish()?;
            writer
                .into_inner()
                .map_err(|e| ArchiveError::io_at(staged.path(), e.into_error()))?;
            stats
        };
        persist_staged(staged, destination)?;

        let secs = start.elapsed().as_secs_f64();
        info!(
            "Compressed {} into {} in {:.3}s: {}/s",
            format_bytes(stats.bytes_in),
            format_bytes(stats.bytes_out),
            secs,
            format_bytes(throughput(stats.bytes_in, secs))
        );
        debug!("{} gzip members, ratio {:.3}", stats.blocks, stats.compression_ratio());
        Ok(stats)
    }
}
