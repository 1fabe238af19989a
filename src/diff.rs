//! Manifest comparison
//!
//! [`compute_diff`] partitions a new manifest against an old one. An entry is
//! unchanged only when its key exists in both manifests with the same size and
//! the same content hash; everything else is changed. Both manifests must be
//! keyed the same way.
//!
//! The archive side compares the fresh manifest (new) against the last
//! persisted one (old), both keyed by source path, and packs only `changed`.
//! The restore side compares the archived manifest (new) against what is on
//! local disk (old), both keyed by archive path, and skips `unchanged`.
//!
//! ```rust
//! use savearc::diff::compute_diff;
//! use savearc::types::Manifest;
//!
//! let diff = compute_diff(&Manifest::new(), &Manifest::new());
//! assert!(!diff.has_changes());
//! ```

use crate::types::{DiffResult, Manifest};
use std::collections::BTreeSet;
use tracing::debug;

/// Partition `new` into changed and unchanged entries relative to `old`
pub fn compute_diff(old: &Manifest, new: &Manifest) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, entry) in new {
        let same = old.get(key).is_some_and(|previous| previous.same_content(entry));
        if same {
            result.unchanged.insert(key.clone(), entry.clone());
        } else {
            result.changed.insert(key.clone(), entry.clone());
        }
    }

    debug!(
        "Diff: {} changed, {} unchanged ({} previously tracked)",
        result.changed.len(),
        result.unchanged.len(),
        old.len()
    );
    result
}

/// Archive paths that need no extraction because the local copy matches
///
/// `archived` is the manifest persisted with the container and `local` the
/// manifest just built from the restore destination; both are re-keyed by
/// archive path before comparison. An empty `archived` manifest yields an
/// empty set, so everything is extracted.
pub fn restore_skip_set(archived: &Manifest, local: &Manifest) -> BTreeSet<String> {
    if archived.is_empty() {
        return BTreeSet::new();
    }
    compute_diff(&local.rekey_by_archive_path(), &archived.rekey_by_archive_path())
        .unchanged_archive_paths()
}
