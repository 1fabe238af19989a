//! Integration tests for savearc
//!
//! Real-world archive and restore scenarios: repeated runs, mtime noise,
//! excluded subtrees, restores on another machine, and containers large
//! enough to span many gzip members.

use ::savearc::*;
use filetime::FileTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test harness holding one game with a single archival unit
pub struct ArchiveTestHarness {
    pub source: TempDir,
    pub dest: TempDir,
    pub temp: TempDir,
    pub config: ArchiveConfig,
}

impl ArchiveTestHarness {
    pub fn new() -> Self {
        Self::with_exclusions(&[])
    }

    pub fn with_exclusions(exclude: &[&str]) -> Self {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("saves")).unwrap();
        let config = Self::config_for(source.path(), dest.path(), temp.path(), exclude);
        Self {
            source,
            dest,
            temp,
            config,
        }
    }

    pub fn config_for(
        source_base: &Path,
        dest: &Path,
        temp: &Path,
        exclude: &[&str],
    ) -> ArchiveConfig {
        ArchiveConfig::new(dest, temp).with_threads(4).with_game(
            "game",
            GameConfig {
                source_base: Some(source_base.to_string_lossy().into_owned()),
                dest_dir: Some("game".to_string()),
                source_dirs: vec!["saves".to_string()],
                exclude_dirs: exclude.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    pub fn unit(&self) -> UnitPaths {
        self.config.units(None).remove(0)
    }

    pub fn root(&self) -> PathBuf {
        self.source.path().join("saves")
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn archive(&self) -> ArchiveReport {
        ArchiveWriter::new(&self.config).archive_unit(&self.unit()).unwrap()
    }

    pub fn members(&self) -> Vec<String> {
        let reader = compression::open_container(&self.unit().container, 4).unwrap();
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

/// Read every regular file under `root` keyed by its relative path
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap();
            (utils::to_archive_path(rel).unwrap(), fs::read(e.path()).unwrap())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_rerun_leaves_destination_untouched() {
        let harness = ArchiveTestHarness::new();
        harness.write("a.txt", b"0123456789");
        harness.write("sub/b.txt", b"01234567890123456789");
        harness.archive();

        let unit = harness.unit();
        let container_meta = fs::metadata(&unit.container).unwrap();
        let manifest_meta = fs::metadata(&unit.manifest).unwrap();
        let container_bytes = fs::read(&unit.container).unwrap();

        let report = harness.archive();
        assert!(report.skipped);
        assert_eq!(
            FileTime::from_last_modification_time(&fs::metadata(&unit.container).unwrap()),
            FileTime::from_last_modification_time(&container_meta)
        );
        assert_eq!(
            FileTime::from_last_modification_time(&fs::metadata(&unit.manifest).unwrap()),
            FileTime::from_last_modification_time(&manifest_meta)
        );
        assert_eq!(fs::read(&unit.container).unwrap(), container_bytes);
        assert!(fs::read_dir(harness.temp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_mtime_changes_alone_are_ignored() {
        let harness = ArchiveTestHarness::new();
        let path = harness.write("slot.sav", b"unchanged content");
        harness.archive();

        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
        assert!(harness.archive().skipped);
    }

    #[test]
    fn test_content_change_detected_with_same_size_and_mtime() {
        let harness = ArchiveTestHarness::new();
        let path = harness.write("slot.sav", b"AAAA");
        harness.write("other.sav", b"BBBB");
        harness.archive();

        let original = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        fs::write(&path, b"CCCC").unwrap();
        filetime::set_file_mtime(&path, original).unwrap();

        let report = harness.archive();
        assert_eq!(report.files_archived, 1);
        assert_eq!(harness.members(), vec!["slot.sav"]);
    }

    #[test]
    fn test_excluded_subtree_contributes_nothing() {
        let harness = ArchiveTestHarness::with_exclusions(&["cache"]);
        harness.write("keep.sav", b"keep");
        harness.write("cache/big.bin", b"skip");
        harness.write("cache/nested/deeper.bin", b"skip");
        harness.write("slots/cache/inner.bin", b"skip");
        harness.write("slots/one.sav", b"one");
        harness.archive();

        assert_eq!(harness.members(), vec!["keep.sav", "slots/one.sav"]);

        // Changes inside an excluded directory never trigger a run
        harness.write("cache/big.bin", b"changed");
        assert!(harness.archive().skipped);
    }

    #[test]
    fn test_restore_on_another_machine() {
        let harness = ArchiveTestHarness::new();
        harness.write("a.txt", b"0123456789");
        harness.write("sub/b.txt", b"01234567890123456789");
        harness.archive();

        // Same destination, different source base
        let other = TempDir::new().unwrap();
        fs::create_dir_all(other.path().join("saves/sub")).unwrap();
        fs::write(other.path().join("saves/a.txt"), b"stale").unwrap();
        fs::write(other.path().join("saves/sub/b.txt"), b"01234567890123456789").unwrap();
        let b_path = other.path().join("saves/sub/b.txt");
        let b_mtime = FileTime::from_unix_time(1_234_567_890, 0);
        filetime::set_file_mtime(&b_path, b_mtime).unwrap();

        let config = ArchiveTestHarness::config_for(
            other.path(),
            harness.dest.path(),
            harness.temp.path(),
            &[],
        );
        let unit = config.units(None).remove(0);
        let report = ArchiveReader::new(&config).restore_unit(&unit).unwrap();

        assert_eq!(report.members_total, 2);
        assert_eq!(report.members_extracted, 1);
        assert_eq!(report.members_skipped, 1);
        assert_eq!(fs::read(other.path().join("saves/a.txt")).unwrap(), b"0123456789");
        // b.txt was not rewritten
        assert_eq!(FileTime::from_last_modification_time(&fs::metadata(&b_path).unwrap()), b_mtime);
        assert_eq!(snapshot(&other.path().join("saves")), snapshot(&harness.root()));
    }

    #[test]
    fn test_large_unit_spans_many_members() {
        let harness = ArchiveTestHarness::new();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..40 {
            let size = rng.random_range(10_000..60_000);
            let content: Vec<u8> = (0..size).map(|_| rng.random()).collect();
            harness.write(&format!("dir{}/file{:03}.bin", i % 5, i), &content);
        }
        let report = harness.archive();
        assert_eq!(report.files_archived, 40);

        // Any gzip reader sees one continuous stream
        let mut plain = Vec::new();
        flate2::read::MultiGzDecoder::new(fs::File::open(&harness.unit().container).unwrap())
            .read_to_end(&mut plain)
            .unwrap();
        let mut parallel = Vec::new();
        compression::open_container(&harness.unit().container, 4)
            .unwrap()
            .read_to_end(&mut parallel)
            .unwrap();
        assert_eq!(plain, parallel);

        let expected = snapshot(&harness.root());
        fs::remove_dir_all(harness.root()).unwrap();
        ArchiveReader::new(&harness.config).restore_unit(&harness.unit()).unwrap();
        assert_eq!(snapshot(&harness.root()), expected);
    }

    #[test]
    fn test_restored_manifest_matches_archived() {
        let harness = ArchiveTestHarness::new();
        harness.write("a.sav", b"a");
        harness.archive();

        let unit = harness.unit();
        ArchiveReader::new(&harness.config).restore_unit(&unit).unwrap();
        assert_eq!(
            ManifestStore::load(&unit.restored_manifest),
            ManifestStore::load(&unit.manifest)
        );
    }

    #[test]
    fn test_progress_callback_reports_hashing() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let harness = ArchiveTestHarness::new();
        for i in 0..150 {
            harness.write(&format!("f{:03}.sav", i), format!("{}", i).as_bytes());
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let callback: ProgressCallback = Arc::new(move |_info: ProgressInfo| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let summary = SaveArchiver::new(harness.config.clone())
            .with_progress(callback)
            .archive_all()
            .unwrap();
        assert!(summary.is_success());
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
