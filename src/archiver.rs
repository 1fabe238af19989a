//! Run-level orchestration
//!
//! [`SaveArchiver`] walks every configured game and archival unit in name
//! order and archives or restores each one. A failing unit is logged and
//! recorded in the [`RunSummary`]; the remaining units still run.

use crate::archive::ArchiveWriter;
use crate::config::{ArchiveConfig, UnitPaths};
use crate::error::{ArchiveError, Result};
use crate::restore::ArchiveReader;
use crate::types::{ArchiveReport, ProgressCallback, RestoreReport};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// A unit that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Game the unit belongs to
    pub game: String,
    /// Unit name (the source subdirectory)
    pub unit: String,
    /// Rendered error
    pub message: String,
}

/// Results of processing every selected unit
#[derive(Debug, Clone)]
pub struct RunSummary<T> {
    /// Reports of units that completed
    pub completed: Vec<T>,
    /// Units that failed, in processing order
    pub failures: Vec<UnitFailure>,
    /// Wall time for the whole run
    pub duration: Duration,
}

impl<T> Default for RunSummary<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

impl<T> RunSummary<T> {
    /// True when no unit failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Units attempted
    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }
}

/// Archives and restores every configured game
///
/// # Example
///
/// ```rust,no_run
/// use savearc::{ArchiveConfig, SaveArchiver};
///
/// # fn main() -> savearc::Result<()> {
/// let config = ArchiveConfig::load(&ArchiveConfig::default_path()?)?;
/// let summary = SaveArchiver::new(config).archive_all()?;
/// println!("{} units archived", summary.completed.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SaveArchiver {
    config: ArchiveConfig,
    only_game: Option<String>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for SaveArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveArchiver")
            .field("config", &self.config)
            .field("only_game", &self.only_game)
            .finish()
    }
}

impl SaveArchiver {
    /// Create an archiver over every configured game
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            only_game: None,
            progress: None,
        }
    }

    /// Restrict the run to one game
    pub fn with_game_filter(mut self, game: Option<String>) -> Self {
        self.only_game = game;
        self
    }

    /// Override the requested thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.config.threads = threads.max(1);
        self
    }

    /// Forward progress to the manifest builder, writer and reader
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Configuration in effect, including any thread override
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Units selected by the current game filter
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Configuration`] if a game filter names an unknown game
    pub fn units(&self) -> Result<Vec<UnitPaths>> {
        if let Some(ref game) = self.only_game {
            if !self.config.games.contains_key(game) {
                return Err(ArchiveError::configuration(format!("unknown game: {}", game)));
            }
        }
        Ok(self.config.units(self.only_game.as_deref()))
    }

    /// Archive every selected unit
    pub fn archive_all(&self) -> Result<RunSummary<ArchiveReport>> {
        let mut writer = ArchiveWriter::new(&self.config);
        if let Some(ref callback) = self.progress {
            writer = writer.with_progress(callback.clone());
        }
        self.run("archive", |unit| writer.archive_unit(unit))
    }

    /// Restore every selected unit
    pub fn restore_all(&self) -> Result<RunSummary<RestoreReport>> {
        let mut reader = ArchiveReader::new(&self.config);
        if let Some(ref callback) = self.progress {
            reader = reader.with_progress(callback.clone());
        }
        self.run("unarchive", |unit| reader.restore_unit(unit))
    }

    fn run<T, F>(&self, action: &str, mut process: F) -> Result<RunSummary<T>>
    where
        F: FnMut(&UnitPaths) -> Result<T>,
    {
        let start = Instant::now();
        let units = self.units()?;
        let mut summary = RunSummary::default();

        info!(
            "Starting {} of {} units with {} threads",
            action,
            units.len(),
            self.config.effective_threads()
        );

        for unit in &units {
            info!("Processing {}: {}", unit.game, unit.name);
            match process(unit) {
                Ok(report) => summary.completed.push(report),
                Err(e) => {
                    error!("Failed to {} {}/{}: {}", action, unit.game, unit.name, e);
                    summary.failures.push(UnitFailure {
                        game: unit.game.clone(),
                        unit: unit.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        summary.duration = start.elapsed();
        info!(
            "Finished {}: {} completed, {} failed",
            action,
            summary.completed.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}
