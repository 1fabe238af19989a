//! Configuration for savearc
//!
//! The configuration is a JSON document, by default at `~/.archive/config.json`:
//!
//! ```json
//! {
//!   "dest_base": "/mnt/sync/saves",
//!   "temp_dir": "/tmp",
//!   "threads": 8,
//!   "games": {
//!     "Witcher3": {
//!       "source_base": "~/Documents/The Witcher 3",
//!       "dest_dir": "witcher3",
//!       "source_dirs": ["gamesaves"],
//!       "exclude_dirs": ["screenshots"]
//!     }
//!   }
//! }
//! ```
//!
//! It is loaded once and passed by reference to the builder, writer and reader.

use crate::error::{ArchiveError, Result};
use crate::exclusion::ExclusionSet;
use crate::utils::expand_tilde;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Worker count used when `threads` is absent
pub const DEFAULT_THREADS: usize = 8;

/// One configured game: a source base and the subdirectories archived from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Directory containing the archival units; may start with `~`
    #[serde(default)]
    pub source_base: Option<String>,
    /// Destination directory, relative to `dest_base`
    #[serde(default)]
    pub dest_dir: Option<String>,
    /// Subdirectories of `source_base`, each archived to its own container
    #[serde(default)]
    pub source_dirs: Vec<String>,
    /// Directory names skipped anywhere below a unit
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
}

/// On-disk shape of the configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    dest_base: Option<String>,
    #[serde(default)]
    temp_dir: Option<String>,
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    games: BTreeMap<String, GameConfig>,
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Root of all destination directories
    pub dest_base: PathBuf,
    /// Scratch space for uncompressed containers
    pub temp_dir: PathBuf,
    /// Requested concurrency budget
    pub threads: usize,
    /// Games keyed by name
    pub games: BTreeMap<String, GameConfig>,
}

/// Every path derived for one archival unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    /// Game the unit belongs to
    pub game: String,
    /// Unit name (the source subdirectory)
    pub name: String,
    /// Expanded `source_base`
    pub source_base: PathBuf,
    /// `source_base/name`, the tree being archived or restored into
    pub source: PathBuf,
    /// Destination directory holding container and manifests
    pub dest_dir: PathBuf,
    /// `<dest_dir>/<name>.tar.gz`
    pub container: PathBuf,
    /// `<dest_dir>/<name>.manifest.json`, written by archive, read by restore
    pub manifest: PathBuf,
    /// `<dest_dir>/<name>.unarchived.manifest.json`, written by restore
    pub restored_manifest: PathBuf,
    /// Directory exclusions for this unit
    pub exclusions: ExclusionSet,
}

impl ArchiveConfig {
    /// Create a configuration with no games
    pub fn new(dest_base: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_base: dest_base.into(),
            temp_dir: temp_dir.into(),
            threads: DEFAULT_THREADS,
            games: BTreeMap::new(),
        }
    }

    /// Set the requested thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Add or replace a game
    pub fn with_game(mut self, name: impl Into<String>, game: GameConfig) -> Self {
        self.games.insert(name.into(), game);
        self
    }

    /// Default location: `~/.archive/config.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".archive").join("config.json"))
            .ok_or_else(|| ArchiveError::configuration("cannot determine home directory"))
    }

    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Configuration`] if the file is missing, malformed, or
    ///   lacks `dest_base` or `temp_dir`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ArchiveError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(content)
            .map_err(|e| ArchiveError::configuration(format!("invalid JSON: {}", e)))?;

        let dest_base = doc
            .dest_base
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ArchiveError::configuration("needs dest_base!"))?;
        let temp_dir = doc
            .temp_dir
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ArchiveError::configuration("needs temp_dir!"))?;

        Ok(Self {
            dest_base: expand_tilde(&dest_base),
            temp_dir: expand_tilde(&temp_dir),
            threads: doc.threads.unwrap_or(DEFAULT_THREADS).max(1),
            games: doc.games,
        })
    }

    /// Thread count actually used for worker pools
    pub fn effective_threads(&self) -> usize {
        clamp_threads(self.threads, num_cpus::get())
    }

    /// Expand every valid game into its archival units, in name order
    ///
    /// Games without `source_base` or `dest_dir` are skipped with a warning.
    pub fn units(&self, only_game: Option<&str>) -> Vec<UnitPaths> {
        let mut units = Vec::new();
        for (game, item) in &self.games {
            if only_game.is_some_and(|g| g != game) {
                continue;
            }
            match self.game_units(game, item) {
                Some(mut game_units) => units.append(&mut game_units),
                None => warn!("Skipping {}: needs source_base and dest_dir", game),
            }
        }
        units
    }

    fn game_units(&self, game: &str, item: &GameConfig) -> Option<Vec<UnitPaths>> {
        let source_base = item.source_base.as_deref().filter(|s| !s.is_empty())?;
        let dest_dir = item.dest_dir.as_deref().filter(|s| !s.is_empty())?;

        let source_base = expand_tilde(source_base);
        let dest_dir = self.dest_base.join(dest_dir);
        let exclusions = ExclusionSet::new(&item.exclude_dirs);

        Some(
            item.source_dirs
                .iter()
                .map(|name| UnitPaths {
                    game: game.to_string(),
                    name: name.clone(),
                    source: source_base.join(name),
                    source_base: source_base.clone(),
                    container: dest_dir.join(format!("{}.tar.gz", name)),
                    manifest: dest_dir.join(format!("{}.manifest.json", name)),
                    restored_manifest: dest_dir.join(format!("{}.unarchived.manifest.json", name)),
                    dest_dir: dest_dir.clone(),
                    exclusions: exclusions.clone(),
                })
                .collect(),
        )
    }
}

/// Clamp a requested thread count to `[1, max(1, cpus - 2)]`
pub fn clamp_threads(requested: usize, cpus: usize) -> usize {
    let ceiling = cpus.saturating_sub(2).max(1);
    requested.clamp(1, ceiling)
}
