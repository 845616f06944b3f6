//! Metadata classification of filesystem items
//!
//! Turns a path and its `lstat` result into an [`Entry`] shell: kind, mode,
//! ownership, size and modification time. Symlinks are never followed; their
//! target string is read verbatim. Block/character devices, FIFOs and sockets
//! are rejected with [`PaxcatError::UnsupportedFileType`].
//!
//! ## Permission strings
//!
//! [`mode_string`] renders mode bits in the `ls -l` layout: a type character
//! followed by three `rwx` triplets, with setuid/setgid/sticky overlays
//! (`s`/`S`, `s`/`S`, `t`/`T`).
//!
//! ```rust
//! use paxcat::classify::mode_string;
//!
//! assert_eq!(mode_string(0o100644), "-rw-r--r--");
//! assert_eq!(mode_string(0o040755), "drwxr-xr-x");
//! assert_eq!(mode_string(0o120777), "lrwxrwxrwx");
//! assert_eq!(mode_string(0o104755), "-rwsr-xr-x");
//! assert_eq!(mode_string(0o041777), "drwxrwxrwt");
//! ```

use crate::error::{PaxcatError, Result};
use crate::types::{Entry, EntryKind, Ownership};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nix::unistd::{Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use tracing::trace;

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// Render mode bits as a ten-character `ls -l` permission string
pub fn mode_string(mode: u32) -> String {
    let mut out = String::with_capacity(10);

    out.push(match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFREG => '-',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        _ => '?',
    });

    let triplets = [
        (0o400, 0o200, 0o100, S_ISUID, 's'),
        (0o040, 0o020, 0o010, S_ISGID, 's'),
        (0o004, 0o002, 0o001, S_ISVTX, 't'),
    ];
    for (r, w, x, special, mark) in triplets {
        out.push(if mode & r != 0 { 'r' } else { '-' });
        out.push(if mode & w != 0 { 'w' } else { '-' });
        out.push(match (mode & x != 0, mode & special != 0) {
            (true, true) => mark,
            (false, true) => mark.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    }

    out
}

/// Classifies filesystem items into entries
///
/// Holds caches of resolved user and group names so each id is looked up in
/// the passwd/group databases at most once per run. Safe to share between
/// worker threads.
#[derive(Debug, Default)]
pub struct Classifier {
    users: DashMap<u32, Option<String>>,
    groups: DashMap<u32, Option<String>>,
}

impl Classifier {
    /// Create a classifier with empty name caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `path` (an absolute path below the source root)
    ///
    /// `relative_path` is the `/`-separated path below the root that both
    /// outputs will record. The item is inspected with `lstat`.
    pub fn classify(&self, path: &Path, relative_path: &str) -> Result<Entry> {
        let metadata = fs::symlink_metadata(path).map_err(|source| PaxcatError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        self.classify_metadata(path, relative_path, &metadata)
    }

    /// Classify an item whose `lstat` result is already known
    pub fn classify_metadata(
        &self,
        path: &Path,
        relative_path: &str,
        metadata: &fs::Metadata,
    ) -> Result<Entry> {
        let file_type = metadata.file_type();

        let kind = if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|source| PaxcatError::Metadata {
                path: path.to_path_buf(),
                source,
            })?;
            let target = target
                .into_os_string()
                .into_string()
                .map_err(PaxcatError::PathConversion)?;
            EntryKind::Symlink { target }
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::RegularFile {
                size: metadata.len(),
                checksum: None,
            }
        } else {
            let kind = if file_type.is_fifo() {
                "fifo"
            } else if file_type.is_socket() {
                "socket"
            } else if file_type.is_block_device() {
                "block device"
            } else if file_type.is_char_device() {
                "character device"
            } else {
                "unknown"
            };
            return Err(PaxcatError::UnsupportedFileType {
                path: path.to_path_buf(),
                kind,
            });
        };

        let name = match path.file_name() {
            Some(name) => name
                .to_str()
                .ok_or_else(|| PaxcatError::PathConversion(name.to_os_string()))?
                .to_string(),
            None => {
                return Err(PaxcatError::internal(format!(
                    "{:?} has no file name",
                    path
                )))
            }
        };

        let modified = DateTime::<Utc>::from_timestamp(metadata.mtime(), metadata.mtime_nsec() as u32)
            .ok_or_else(|| {
                PaxcatError::internal(format!("{:?} has an unrepresentable mtime", path))
            })?;

        let ownership = Ownership {
            uid: metadata.uid(),
            gid: metadata.gid(),
            user: self.user_name(metadata.uid()),
            group: self.group_name(metadata.gid()),
        };

        trace!("Classified {} as {}", relative_path, kind.label());

        Ok(Entry {
            relative_path: relative_path.to_string(),
            name,
            source_path: path.to_path_buf(),
            mode: metadata.mode(),
            ownership,
            modified,
            kind,
        })
    }

    /// Resolve a uid to a user name, cached
    pub fn user_name(&self, uid: u32) -> Option<String> {
        self.users
            .entry(uid)
            .or_insert_with(|| {
                User::from_uid(Uid::from_raw(uid))
                    .ok()
                    .flatten()
                    .map(|user| user.name)
            })
            .clone()
    }

    /// Resolve a gid to a group name, cached
    pub fn group_name(&self, gid: u32) -> Option<String> {
        self.groups
            .entry(gid)
            .or_insert_with(|| {
                Group::from_gid(Gid::from_raw(gid))
                    .ok()
                    .flatten()
                    .map(|group| group.name)
            })
            .clone()
    }
}
