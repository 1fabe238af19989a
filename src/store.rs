//! Manifest persistence
//!
//! Manifests are stored as pretty-printed JSON objects with keys in sorted
//! order. Loading never fails: an absent, unreadable or malformed document is
//! treated as an empty manifest, which makes the next run archive (or restore)
//! everything.

use crate::error::Result;
use crate::types::Manifest;
use crate::utils::atomic_write;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Reads and writes manifest documents
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestStore;

impl ManifestStore {
    /// Load a manifest, falling back to an empty one
    pub fn load(path: &Path) -> Manifest {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No manifest at {:?}, starting empty", path);
                return Manifest::new();
            }
            Err(e) => {
                warn!("Unreadable manifest {:?} ({}), starting empty", path, e);
                return Manifest::new();
            }
        };

        match serde_json::from_slice::<Manifest>(&content) {
            Ok(manifest) => {
                debug!("Loaded manifest {:?} with {} entries", path, manifest.len());
                manifest
            }
            Err(e) => {
                warn!("Malformed manifest {:?} ({}), starting empty", path, e);
                Manifest::new()
            }
        }
    }

    /// Persist a manifest atomically
    ///
    /// The document is written to a temp file in the same directory and
    /// renamed over `path`, so a failed write leaves the previous manifest.
    pub fn save(path: &Path, manifest: &Manifest) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(manifest)?;
        content.push(b'\n');
        atomic_write(path, &content)?;
        debug!("Saved manifest {:?} with {} entries", path, manifest.len());
        Ok(())
    }
}
