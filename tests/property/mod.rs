//! Property-based testing for paxcat
//!
//! Uses proptest to generate random trees and checks the invariants that tie
//! the two outputs together.

use crate::integration::{catalog_rows, read_members};
use ::paxcat::*;
use proptest::prelude::*;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// One item of a generated tree
#[derive(Debug, Clone)]
pub enum TreeItem {
    File(Vec<u8>),
    Dir,
    Link(String),
}

/// Generate random relative paths of 1 to 3 components
fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9_.-]{1,12}", 1..=3)
        .prop_filter("no dot components", |parts| {
            parts.iter().all(|p| p != "." && p != "..")
        })
}

/// Generate random file content, occasionally larger than a chunk
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 0..2048),
        1 => (1usize..4).prop_map(|n| vec![b'z'; n * 4096 + 1]),
    ]
}

fn item_strategy() -> impl Strategy<Value = TreeItem> {
    prop_oneof![
        5 => content_strategy().prop_map(TreeItem::File),
        1 => Just(TreeItem::Dir),
        1 => "[a-z./]{1,40}".prop_map(TreeItem::Link),
    ]
}

/// Whether some existing ancestor of `parts` is not a real directory
fn blocked(root: &Path, parts: &[String]) -> bool {
    let mut current = root.to_path_buf();
    for part in &parts[..parts.len() - 1] {
        current.push(part);
        if let Ok(metadata) = current.symlink_metadata() {
            if !metadata.is_dir() {
                return true;
            }
        }
    }
    false
}

/// Materialize a generated tree; items colliding with earlier ones are dropped
fn build_tree(root: &Path, items: &[(Vec<String>, TreeItem)]) {
    for (parts, item) in items {
        // never create anything through a symlink or below a file
        if blocked(root, parts) {
            continue;
        }
        let path = parts.iter().fold(root.to_path_buf(), |p, part| p.join(part));
        let parent = path.parent().unwrap();
        if fs::create_dir_all(parent).is_err() || path.symlink_metadata().is_ok() {
            continue;
        }
        let _ = match item {
            TreeItem::File(content) => fs::write(&path, content),
            TreeItem::Dir => fs::create_dir(&path),
            TreeItem::Link(target) => std::os::unix::fs::symlink(target, &path),
        };
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_catalog_order_matches_archive(
        items in prop::collection::vec((path_strategy(), item_strategy()), 0..30)
    ) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        fs::create_dir(&source).unwrap();
        build_tree(&source, &items);

        let summary = PaxcatBuilder::new()
            .chunk_size(1024)
            .parallel_workers(3)
            .build(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();

        let text = fs::read_to_string(&summary.catalog_path).unwrap();
        let blocks = parse_catalog(&text).unwrap();
        let rows = catalog_rows(&source.canonicalize().unwrap(), &blocks);
        let members = read_members(&summary.archive_path);

        prop_assert_eq!(rows.len(), members.len());
        prop_assert!(summary.skipped.is_empty());

        let mut directories = BTreeSet::new();
        for ((path, row), member) in rows.iter().zip(&members) {
            prop_assert_eq!(path.as_str(), member.path.trim_end_matches('/'));
            match member.kind {
                tar::EntryType::Regular => {
                    prop_assert_eq!(row.checksum.to_hex(), hex::encode(Sha1::digest(&member.content)));
                    prop_assert_eq!(row.size, Some(member.content.len() as u64));
                }
                tar::EntryType::Symlink => {
                    prop_assert!(row.checksum.is_zero());
                    prop_assert_eq!(&row.link_target, &member.link);
                    prop_assert_eq!(row.size, row.link_target.as_ref().map(|t| t.len() as u64));
                }
                tar::EntryType::Directory => {
                    prop_assert!(row.checksum.is_zero());
                    prop_assert_eq!(row.size, None);
                    directories.insert(path.clone());
                }
                other => prop_assert!(false, "unexpected member type {:?}", other),
            }
        }

        // one block per directory plus the root
        prop_assert_eq!(blocks.len(), directories.len() + 1);
    }

    #[test]
    fn prop_chunk_size_does_not_change_checksums(
        content in prop::collection::vec(any::<u8>(), 0..50_000),
        chunk in 512usize..20_000,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("data"), &content).unwrap();

        let summary = PaxcatBuilder::new()
            .chunk_size(chunk)
            .queue_depth(1)
            .build(&source, temp_dir.path().join("out"))
            .unwrap()
            .run()
            .unwrap();

        let text = fs::read_to_string(&summary.catalog_path).unwrap();
        let blocks = parse_catalog(&text).unwrap();
        prop_assert_eq!(blocks[0].rows[0].checksum.to_hex(), hex::encode(Sha1::digest(&content)));
    }
}
