//! Property-based testing for savearc
//!
//! Uses proptest to verify invariants across randomly generated manifests
//! and directory trees.

use ::savearc::*;
use crate::integration::ArchiveTestHarness;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::TempDir;

/// Generate a relative path with 1-3 components
fn rel_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,7}", 1..=3).prop_map(|parts| parts.join("/"))
}

/// Generate a manifest entry rooted at `/saves`
fn entry_strategy() -> impl Strategy<Value = ManifestEntry> {
    (rel_path_strategy(), any::<u64>(), "[0-9a-f]{40}").prop_map(|(rel, size, hash)| ManifestEntry {
        source_path: PathBuf::from(format!("/saves/{}", rel)),
        archive_path: rel,
        size,
        content_hash: hash,
    })
}

fn manifest_strategy() -> impl Strategy<Value = Manifest> {
    prop::collection::vec(entry_strategy(), 0..20).prop_map(|entries| {
        entries
            .into_iter()
            .map(|e| (e.source_path.to_string_lossy().into_owned(), e))
            .collect()
    })
}

/// Generate a file tree: relative path to content
///
/// Paths are prefixed per depth so a file never shadows a directory.
fn tree_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        prop::collection::vec("[a-z]{1,6}", 1..=3).prop_map(|parts| {
            let last = parts.len() - 1;
            parts
                .iter()
                .enumerate()
                .map(|(i, p)| if i == last { format!("f_{}", p) } else { format!("d_{}", p) })
                .collect::<Vec<_>>()
                .join("/")
        }),
        prop::collection::vec(any::<u8>(), 0..2048),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_manifest_save_load_round_trip(manifest in manifest_strategy()) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("unit.manifest.json");
        ManifestStore::save(&path, &manifest).unwrap();
        prop_assert_eq!(ManifestStore::load(&path), manifest);
    }

    #[test]
    fn prop_diff_partitions_new_manifest(old in manifest_strategy(), new in manifest_strategy()) {
        let diff = diff::compute_diff(&old, &new);
        prop_assert_eq!(diff.changed.len() + diff.unchanged.len(), new.len());
        prop_assert!(!diff::compute_diff(&new, &new).has_changes());
    }

    #[test]
    fn prop_block_compression_round_trip(
        data in prop::collection::vec(any::<u8>(), 0..300_000),
        threads in 1usize..4,
    ) {
        let mut encoder =
            BlockGzEncoder::new(Vec::new(), threads, compression::MIN_BLOCK_SIZE).unwrap();
        encoder.write_all(&data).unwrap();
        let (compressed, _) = encoder.finish().unwrap();

        let mut decoded = Vec::new();
        compression::decoder_for(std::io::Cursor::new(compressed), threads)
            .unwrap()
            .read_to_end(&mut decoded)
            .unwrap();
        prop_assert_eq!(decoded, data);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_archive_then_restore_reproduces_tree(tree in tree_strategy()) {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();

        for (rel, content) in &tree {
            let path = source.path().join("saves").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let config = ArchiveTestHarness::config_for(source.path(), dest.path(), temp.path(), &[]);
        let report = ArchiveWriter::new(&config).archive_unit(&config.units(None)[0]).unwrap();
        prop_assert_eq!(report.files_archived, tree.len());

        let restore =
            ArchiveTestHarness::config_for(target.path(), dest.path(), temp.path(), &[]);
        ArchiveReader::new(&restore).restore_unit(&restore.units(None)[0]).unwrap();

        let restored = crate::integration::snapshot(&target.path().join("saves"));
        prop_assert_eq!(restored, tree);
    }
}
