//! Main test module for savearc
//!
//! This module includes all test suites:
//! - Integration tests for archive and restore scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::savearc::*;
    use std::fs;
    use tempfile::TempDir;

    fn single_unit(source: &TempDir, dest: &TempDir, temp: &TempDir) -> (ArchiveConfig, UnitPaths) {
        let config = ArchiveConfig::new(dest.path(), temp.path()).with_threads(2).with_game(
            "edge",
            GameConfig {
                source_base: Some(source.path().to_string_lossy().into_owned()),
                dest_dir: Some("edge".to_string()),
                source_dirs: vec!["saves".to_string()],
                exclude_dirs: vec![],
            },
        );
        let unit = config.units(None).remove(0);
        (config, unit)
    }

    #[test]
    fn test_empty_directory() {
        let (source, dest, temp) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        fs::create_dir_all(source.path().join("saves")).unwrap();
        let (config, unit) = single_unit(&source, &dest, &temp);

        // An empty unit never produces a container
        let report = ArchiveWriter::new(&config).archive_unit(&unit).unwrap();
        assert!(report.skipped);
        assert_eq!(report.files_scanned, 0);
        assert!(!unit.container.exists());
    }

    #[test]
    fn test_empty_file() -> anyhow::Result<()> {
        let (source, dest, temp) = (TempDir::new()?, TempDir::new()?, TempDir::new()?);
        fs::create_dir_all(source.path().join("saves"))?;
        fs::write(source.path().join("saves/empty.sav"), b"")?;
        let (config, unit) = single_unit(&source, &dest, &temp);

        let report = ArchiveWriter::new(&config).archive_unit(&unit)?;
        assert_eq!(report.files_archived, 1);

        let manifest = ManifestStore::load(&unit.manifest);
        let entry = manifest.values().next().expect("one entry");
        assert_eq!(entry.size, 0);
        assert_eq!(entry.content_hash, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        Ok(())
    }

    #[test]
    fn test_unicode_and_spaces_in_names() {
        let (source, dest, temp) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        let dir = source.path().join("saves/Slot 1 – héros");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sauvegarde ü.dat"), b"bonjour").unwrap();
        let (config, unit) = single_unit(&source, &dest, &temp);

        ArchiveWriter::new(&config).archive_unit(&unit).unwrap();
        fs::remove_dir_all(source.path().join("saves")).unwrap();
        ArchiveReader::new(&config).restore_unit(&unit).unwrap();

        assert_eq!(fs::read(dir.join("sauvegarde ü.dat")).unwrap(), b"bonjour");
    }

    #[test]
    fn test_corrupt_manifest_rearchives_everything() {
        let (source, dest, temp) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        fs::create_dir_all(source.path().join("saves")).unwrap();
        fs::write(source.path().join("saves/a.sav"), b"a").unwrap();
        fs::write(source.path().join("saves/b.sav"), b"b").unwrap();
        let (config, unit) = single_unit(&source, &dest, &temp);

        let writer = ArchiveWriter::new(&config);
        writer.archive_unit(&unit).unwrap();
        fs::write(&unit.manifest, b"not json at all").unwrap();

        let report = writer.archive_unit(&unit).unwrap();
        assert!(!report.skipped);
        assert_eq!(report.files_archived, 2);
    }

    #[test]
    fn test_restore_without_container_fails() {
        let (source, dest, temp) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        let (config, unit) = single_unit(&source, &dest, &temp);

        let err = ArchiveReader::new(&config).restore_unit(&unit).unwrap_err();
        assert!(matches!(err, ArchiveError::ArchiveNotFound(_)));
        assert!(!unit.restored_manifest.exists());
    }
}
