//! Directory exclusion rules
//!
//! An [`ExclusionSet`] holds directory names. A directory is excluded when its
//! own name is in the set or when any ancestor below the archival unit root is.
//! The walker asks once per directory and never descends into an excluded one.

use std::collections::BTreeSet;
use std::path::{Component, Path};

/// Set of directory names to skip while building a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    /// Build from configured names; blank entries and separators are trimmed
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().trim_matches(|c| c == '/' || c == '\\').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { names }
    }

    /// Whether no pattern is configured
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a single path segment matches a pattern exactly
    pub fn matches_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether a directory, given relative to the unit root, is excluded
    ///
    /// The unit root itself (an empty relative path) is never excluded.
    pub fn is_excluded(&self, relative_dir: &Path) -> bool {
        if self.names.is_empty() {
            return false;
        }
        relative_dir.components().any(|c| match c {
            Component::Normal(part) => self.matches_name(&part.to_string_lossy()),
            _ => false,
        })
    }
}
