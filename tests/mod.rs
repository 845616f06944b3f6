//! Main test module for paxcat
//!
//! This module includes all test suites:
//! - Integration tests for realistic trees and failure handling
//! - Property-based tests for the archive/catalog invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::paxcat::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unicode_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("tree");
        fs::create_dir(&source).unwrap();

        let names = ["файл.txt", "文件.txt", "αρχείο.txt", "🚀🌟💾.txt"];
        let mut created = Vec::new();
        for name in &names {
            if fs::write(source.join(name), name.as_bytes()).is_ok() {
                created.push(name.to_string());
            }
        }
        if created.is_empty() {
            return;
        }
        created.sort();

        let summary = Paxcat::new(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();
        let blocks = parse_catalog(&fs::read_to_string(&summary.catalog_path).unwrap()).unwrap();
        let listed: Vec<String> = blocks[0].rows.iter().map(|r| r.name.clone()).collect();
        assert_eq!(listed, created);
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("tree");
        fs::create_dir(&source).unwrap();

        let names = [
            "file with spaces.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file[with]brackets.txt",
            "-leading-dash",
        ];
        for name in &names {
            fs::write(source.join(name), "x").unwrap();
        }

        let summary = Paxcat::new(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.files, names.len());
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn test_non_utf8_name_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("tree");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("fine"), "ok").unwrap();
        let bad = source.join(OsStr::from_bytes(b"bad\xff"));
        if fs::write(&bad, "x").is_err() {
            // filesystem enforces UTF-8 names
            return;
        }

        let summary = Paxcat::new(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 1);
    }

    #[test]
    fn test_long_paths_and_targets() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("tree");
        let deep: std::path::PathBuf = (0..6).map(|i| format!("{}{}", "segment", i).repeat(4)).collect();
        fs::create_dir_all(source.join(&deep)).unwrap();
        fs::write(source.join(&deep).join("leaf.txt"), "leaf").unwrap();
        let target = "t".repeat(180);
        std::os::unix::fs::symlink(&target, source.join("long-link")).unwrap();

        let summary = Paxcat::new(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.symlinks, 1);

        let file = fs::File::open(&summary.archive_path).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut found_leaf = false;
        let mut found_link = false;
        for item in archive.entries().unwrap() {
            let item = item.unwrap();
            let path = item.path().unwrap().to_string_lossy().to_string();
            if path.ends_with("leaf.txt") {
                assert_eq!(path, format!("{}/leaf.txt", deep.to_string_lossy()));
                found_leaf = true;
            }
            if path == "long-link" {
                let link = item.link_name().unwrap().unwrap();
                assert_eq!(link.to_string_lossy(), target);
                found_link = true;
            }
        }
        assert!(found_leaf && found_link);
    }
}
