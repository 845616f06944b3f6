//! Integration tests for paxcat
//!
//! Builds realistic trees, archives them through the public API and reads
//! both outputs back with independent tools (`tar` + `flate2` for the
//! archive, the catalog parser for the text side).

use ::paxcat::*;
use filetime::FileTime;
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One archive member read back from disk
#[derive(Debug, Clone)]
pub struct Member {
    pub path: String,
    pub kind: tar::EntryType,
    pub mode: u32,
    pub mtime: u64,
    pub content: Vec<u8>,
    pub link: Option<String>,
}

/// Read every member of a `.pax.gz` archive
pub fn read_members(path: &Path) -> Vec<Member> {
    let file = fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut members = Vec::new();
    for item in archive.entries().unwrap() {
        let mut item = item.unwrap();
        let header = item.header().clone();
        let link = item
            .link_name()
            .unwrap()
            .map(|l| l.to_string_lossy().to_string());
        let path = item.path().unwrap().to_string_lossy().to_string();
        let mut content = Vec::new();
        item.read_to_end(&mut content).unwrap();
        members.push(Member {
            path,
            kind: header.entry_type(),
            mode: header.mode().unwrap(),
            mtime: header.mtime().unwrap(),
            content,
            link,
        });
    }
    members
}

/// Flatten catalog blocks into `(relative path, row)` pairs in file order
pub fn catalog_rows(root: &Path, blocks: &[CatalogBlock]) -> Vec<(String, CatalogRow)> {
    let root = root.to_string_lossy().to_string();
    let mut rows = Vec::new();
    for block in blocks {
        let prefix = block
            .directory
            .strip_prefix(&root)
            .unwrap()
            .trim_start_matches('/');
        for row in &block.rows {
            rows.push((utils::join_relative(prefix, &row.name), row.clone()));
        }
    }
    rows
}

/// Test harness owning a source tree and an output directory
pub struct PaxcatTestHarness {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub output_dir: PathBuf,
    rng: StdRng,
    runs: usize,
}

impl PaxcatTestHarness {
    pub fn new(seed: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let output_dir = temp_dir.path().join("output");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&output_dir).unwrap();
        Self {
            source: source.canonicalize().unwrap(),
            output_dir,
            temp_dir,
            rng: StdRng::seed_from_u64(seed),
            runs: 0,
        }
    }

    /// Write a file with random content of `len` bytes
    pub fn random_file(&mut self, relative: &str, len: usize) -> anyhow::Result<Vec<u8>> {
        let path = self.source.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content: Vec<u8> = (0..len).map(|_| self.rng.random()).collect();
        fs::write(&path, &content)?;
        Ok(content)
    }

    /// Generate a project-like tree with `dirs` directories of `files` files
    pub fn generate_tree(&mut self, dirs: usize, files: usize) -> anyhow::Result<()> {
        for d in 0..dirs {
            let depth = self.rng.random_range(1..4);
            let dir: Vec<String> = (0..depth).map(|level| format!("dir{}_{}", d, level)).collect();
            let dir = dir.join("/");
            for f in 0..files {
                let len = self.rng.random_range(0..20_000);
                self.random_file(&format!("{}/file{}.bin", dir, f), len)?;
            }
        }
        Ok(())
    }

    pub fn archive(&mut self, builder: PaxcatBuilder) -> Result<RunSummary> {
        self.runs += 1;
        let prefix = self.output_dir.join(format!("run{}", self.runs));
        builder.build(&self.source, prefix)?.run()
    }

    pub fn catalog(&self, summary: &RunSummary) -> Vec<(String, CatalogRow)> {
        let text = fs::read_to_string(&summary.catalog_path).unwrap();
        catalog_rows(&self.source, &parse_catalog(&text).unwrap())
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_generated_tree_round_trips() {
        let mut harness = PaxcatTestHarness::new(42);
        harness.generate_tree(8, 5).unwrap();
        let big = harness.random_file("big/blob.bin", 3 * 1024 * 1024 + 17).unwrap();

        let summary = harness
            .archive(PaxcatBuilder::new().chunk_size(4096).spool_threshold(64 * 1024))
            .unwrap();
        let rows = harness.catalog(&summary);
        let members = read_members(&summary.archive_path);

        assert_eq!(rows.len(), members.len());
        for ((path, row), member) in rows.iter().zip(&members) {
            assert_eq!(path, member.path.trim_end_matches('/'));
            if member.kind == tar::EntryType::Regular {
                assert_eq!(row.checksum.to_hex(), hex::encode(Sha1::digest(&member.content)));
                let on_disk = fs::read(harness.source.join(path)).unwrap();
                assert_eq!(on_disk, member.content);
            }
        }

        let blob = members.iter().find(|m| m.path == "big/blob.bin").unwrap();
        assert_eq!(blob.content.len(), big.len());
        assert!(summary.skipped.is_empty());
        assert!(summary.compressed_bytes > 0);
    }

    #[test]
    fn test_mtime_and_mode_preserved() {
        let mut harness = PaxcatTestHarness::new(7);
        harness.random_file("script.sh", 10).unwrap();
        let script = harness.source.join("script.sh");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o4755)).unwrap();
        filetime::set_file_mtime(&script, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let summary = harness.archive(PaxcatBuilder::new()).unwrap();
        let rows = harness.catalog(&summary);
        let members = read_members(&summary.archive_path);

        assert_eq!(members[0].mtime, 1_600_000_000);
        assert_eq!(members[0].mode, 0o4755);
        assert_eq!(rows[0].1.mode, "-rwsr-xr-x");
        let expected = chrono::DateTime::from_timestamp(1_600_000_000, 0)
            .unwrap()
            .with_timezone(&chrono::Local)
            .naive_local();
        assert_eq!(rows[0].1.modified, expected);
    }

    #[test]
    fn test_symlink_targets_verbatim() {
        let harness = PaxcatTestHarness::new(1);
        let targets = ["./a//b", "../../outside", "/etc/passwd", "dangling", "ü/ümlaut"];
        for (i, target) in targets.iter().enumerate() {
            symlink(target, harness.source.join(format!("link{}", i))).unwrap();
        }

        let mut harness = harness;
        let summary = harness.archive(PaxcatBuilder::new()).unwrap();
        let rows = harness.catalog(&summary);
        let members = read_members(&summary.archive_path);

        for (i, target) in targets.iter().enumerate() {
            assert_eq!(rows[i].1.link_target.as_deref(), Some(*target));
            assert_eq!(rows[i].1.size, Some(target.len() as u64));
            assert!(rows[i].1.checksum.is_zero());
            assert_eq!(members[i].link.as_deref(), Some(*target));
            assert!(members[i].content.is_empty());
        }
        assert_eq!(summary.symlinks, targets.len());
        // nothing outside the root was visited
        assert_eq!(summary.files, 0);
    }

    #[test]
    #[traced_test]
    fn test_abort_policy_stops_run() {
        let mut harness = PaxcatTestHarness::new(3);
        harness.random_file("a", 10).unwrap();
        nix::unistd::mkfifo(&harness.source.join("b"), nix::sys::stat::Mode::S_IRWXU).unwrap();
        harness.random_file("c", 10).unwrap();

        let err = harness
            .archive(PaxcatBuilder::new().error_policy(ErrorPolicy::Abort))
            .unwrap_err();
        assert!(matches!(err, PaxcatError::Aborted { .. }));
        assert!(err.user_message().contains("abort-on-error"));

        let summary = harness.archive(PaxcatBuilder::new()).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.contains("fifo"));
    }

    #[test]
    fn test_progress_reports_every_entry() {
        let mut harness = PaxcatTestHarness::new(11);
        harness.generate_tree(3, 4).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let summary = harness
            .archive(PaxcatBuilder::new().progress_callback(Arc::new(move |info: ProgressInfo| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert!(info.current_item.is_some());
            })))
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), summary.entries());
    }

    #[test]
    fn test_worker_counts_agree() {
        let mut harness = PaxcatTestHarness::new(99);
        harness.generate_tree(6, 6).unwrap();

        let one = harness.archive(PaxcatBuilder::new().parallel_workers(1)).unwrap();
        let many = harness.archive(PaxcatBuilder::new().parallel_workers(8)).unwrap();

        let rows_one: Vec<_> = harness.catalog(&one).into_iter().map(|(p, r)| (p, r.checksum)).collect();
        let rows_many: Vec<_> = harness.catalog(&many).into_iter().map(|(p, r)| (p, r.checksum)).collect();
        assert_eq!(rows_one, rows_many);

        let names = |s: &RunSummary| -> Vec<String> {
            read_members(&s.archive_path).into_iter().map(|m| m.path).collect()
        };
        assert_eq!(names(&one), names(&many));
    }

    #[test]
    fn test_output_already_exists() {
        let mut harness = PaxcatTestHarness::new(5);
        harness.random_file("a", 1).unwrap();
        fs::write(harness.output_dir.join("run1.pax.gz"), "stale").unwrap();

        let err = harness.archive(PaxcatBuilder::new()).unwrap_err();
        assert!(matches!(err, PaxcatError::Precondition(_)));
        // the stale file is untouched and no catalog was created
        assert_eq!(fs::read(harness.output_dir.join("run1.pax.gz")).unwrap(), b"stale");
        assert!(!harness.output_dir.join("run1.txt").exists());
    }
}
