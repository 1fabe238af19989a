//! Utility functions for savearc
//!
//! File hashing, path normalization, byte formatting and atomic writes shared
//! by the manifest, archive and restore code.

use crate::error::{ArchiveError, Result};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

/// Read size for content hashing
pub const HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Hash a file's content using SHA-1
///
/// The file is streamed in [`HASH_BLOCK_SIZE`] reads so memory use does not
/// depend on file size.
///
/// # Errors
///
/// - [`ArchiveError::PathIo`] naming the file if it cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ArchiveError::io_at(path, e))?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ArchiveError::io_at(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-1
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert a relative path into a container member name
///
/// Joins normal components with `/`, dropping `.` and any root or prefix so
/// the result never starts with a separator.
///
/// # Errors
///
/// - [`ArchiveError::NonUtf8Path`] if a component is not valid UTF-8
pub fn to_archive_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| ArchiveError::NonUtf8Path(relative.to_path_buf()))?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

/// Normalize a member name read from a container for set lookups
pub fn normalize_member_name(name: &str) -> String {
    name.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Format bytes in human-readable form using 1024-based units
///
/// ```rust,ignore
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Bytes per second, guarding against a zero duration
pub fn throughput(bytes: u64, seconds: f64) -> u64 {
    if seconds > 0.0 {
        (bytes as f64 / seconds) as u64
    } else {
        bytes
    }
}

/// Create a staging file next to `path` for a later atomic rename
pub fn staging_file_for(path: &Path) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_at(parent, e))?;
    tempfile::Builder::new()
        .prefix(".savearc-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| ArchiveError::io_at(parent, e))
}

/// Atomically replace `path` with a fully written staging file
pub fn persist_staged(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .map_err(|e| ArchiveError::io_at(path, e.error))?;
    trace!("Persisted {:?}", path);
    Ok(())
}

/// Atomic file write (write to a temp file in the same directory, then rename)
///
/// If any step fails the temp file is removed and the previous content of
/// `path` is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut staged = staging_file_for(path)?;
    staged
        .write_all(content)
        .map_err(|e| ArchiveError::io_at(staged.path(), e))?;
    persist_staged(staged, path)
}
