//! Error types for savearc
//!
//! Errors fall into four groups, each handled differently by the caller:
//!
//! - **Configuration errors** are fatal and reported once before any work starts.
//! - **Manifest corruption or absence** never reaches this type: the manifest
//!   store recovers by returning an empty manifest.
//! - **Per-file I/O errors** while hashing or extracting abort the current
//!   archival unit but not its siblings.
//! - **Archive write/compress errors** abort the unit and leave any previous
//!   destination container in place.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the savearc library
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Main error type for all savearc operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O errors not tied to a specific path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error while reading or writing a specific file
    #[error("IO error on {path:?}: {source}")]
    PathIo {
        /// Offending path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Missing or invalid configuration
    #[error("Bad configuration: {0}")]
    Configuration(String),

    /// Archival unit source directory does not exist
    #[error("Source directory not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// Compressed container does not exist
    #[error("Archive not found: {0:?}")]
    ArchiveNotFound(PathBuf),

    /// Container stream could not be decoded (truncated, corrupt, bad index)
    #[error("Decompression error in {path:?}: {source}")]
    Decompression {
        /// Container being read
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// File name that cannot be stored in a manifest
    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),

    /// Compression pipeline failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// Worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// Attach a path to an I/O error
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::PathIo {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error with a custom message
    pub fn configuration(msg: impl Into<String>) -> Self {
        ArchiveError::Configuration(msg.into())
    }

    /// Attach the container path to a read failure
    pub fn decompression(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Decompression {
            path: path.into(),
            source,
        }
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        ArchiveError::Compression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ArchiveError::Internal(msg.into())
    }

    /// Check if this error must stop the whole run rather than one unit
    pub fn is_config_error(&self) -> bool {
        matches!(self, ArchiveError::Configuration(_))
    }
}

impl From<rayon::ThreadPoolBuildError> for ArchiveError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ArchiveError::ThreadPool(err.to_string())
    }
}
