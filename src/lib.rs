//! # Savearc - Incremental save-game archiving
//!
//! Packs configured save-game directories into compressed tar containers and
//! restores them, touching only what changed.
//!
//! ## Overview
//!
//! Each configured game names a source base and a list of source
//! subdirectories. Every subdirectory is an *archival unit* with its own
//! container and manifest in the game's destination directory:
//!
//! - `<unit>.tar.gz` holds the files that changed since the last run
//! - `<unit>.manifest.json` records size and SHA-1 of every file in the unit
//! - `<unit>.unarchived.manifest.json` is written by a restore
//!
//! A manifest maps each file's absolute path to its archive path, size and
//! content hash. Archiving compares a freshly built manifest with the stored
//! one and skips the unit entirely when nothing changed. Restoring compares
//! the stored manifest with the files already on disk and extracts only the
//! members that differ. Modification times never participate.
//!
//! ## Architecture
//!
//! - **Manifests**: a single-threaded directory walk with subtree exclusion,
//!   followed by parallel SHA-1 hashing on a bounded worker pool
//! - **Containers**: deterministic GNU tar, sorted by archive path, compressed
//!   as independent gzip members so both compression and decompression run
//!   in parallel while staying readable by any gzip tool
//! - **Atomic writes**: containers and manifests are staged next to their
//!   destination and renamed into place
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savearc::{ArchiveConfig, GameConfig, SaveArchiver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ArchiveConfig::new("/backups", "/tmp").with_game(
//!     "factorio",
//!     GameConfig {
//!         source_base: Some("~/.factorio".to_string()),
//!         dest_dir: Some("factorio".to_string()),
//!         source_dirs: vec!["saves".to_string()],
//!         exclude_dirs: vec!["autosaves".to_string()],
//!     },
//! );
//!
//! let archiver = SaveArchiver::new(config);
//! let summary = archiver.archive_all()?;
//! for report in &summary.completed {
//!     println!("{}: {} files archived", report.unit, report.files_archived);
//! }
//!
//! // Later, possibly on another machine
//! archiver.restore_all()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Work inside a unit is parallel; units themselves run one after another.
//! Progress callbacks are invoked from worker threads and must be
//! `Send + Sync`.

// Public API modules
pub mod archive;
pub mod archiver;
pub mod compression;
pub mod config;
pub mod diff;
pub mod error;
pub mod exclusion;
pub mod manifest;
pub mod restore;
pub mod store;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use archive::ArchiveWriter;
pub use archiver::{RunSummary, SaveArchiver, UnitFailure};
pub use compression::{BlockGzDecoder, BlockGzEncoder, CompressionStats};
pub use config::{ArchiveConfig, GameConfig, UnitPaths};
pub use error::{ArchiveError, Result};
pub use exclusion::ExclusionSet;
pub use manifest::ManifestBuilder;
pub use restore::ArchiveReader;
pub use store::ManifestStore;
pub use types::*;
