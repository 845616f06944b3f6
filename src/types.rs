//! Core data types used throughout the paxcat library
//!
//! This module contains the data model shared by the classifier, the
//! per-file pipeline, the archive encoder and the catalog writer.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Filesystem items**: [`Entry`], [`EntryKind`], [`Ownership`], [`Checksum`]
//! - **Configuration**: [`PaxcatConfig`], [`ErrorPolicy`]
//! - **Results**: [`RunSummary`], [`SkippedItem`]
//! - **Progress**: [`ProgressInfo`], [`ProgressCallback`]
//!
//! ## Examples
//!
//! ```rust
//! use paxcat::types::{Checksum, EntryKind};
//!
//! let kind = EntryKind::Symlink { target: "a.txt".to_string() };
//! assert_eq!(kind.size(), Some(5));
//! assert_eq!(kind.checksum(), Some(Checksum::ZERO));
//! assert_eq!(EntryKind::Directory.size(), None);
//! ```

use crate::compression::CompressionLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// 160-bit SHA-1 digest of a regular file's content
///
/// Directories and symlinks carry [`Checksum::ZERO`]; checksums are never
/// computed for anything but regular file content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum(pub [u8; 20]);

impl Checksum {
    /// The all-zero checksum recorded for directories and symlinks
    pub const ZERO: Checksum = Checksum([0u8; 20]);

    /// Lowercase 40-character hexadecimal rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the all-zero sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl std::str::FromStr for Checksum {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Checksum(bytes))
    }
}

impl Serialize for Checksum {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Numeric and resolved owner/group of an item
///
/// Persisted in the archive header only; never written to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    /// Numeric user id
    pub uid: u32,
    /// Numeric group id
    pub gid: u32,
    /// User name, when the uid resolves
    pub user: Option<String>,
    /// Group name, when the gid resolves
    pub group: Option<String>,
}

/// Kind-specific part of an [`Entry`]
///
/// Each variant only carries the fields that are meaningful for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A directory; no size, no content, zero checksum
    Directory,
    /// A regular file
    RegularFile {
        /// Content length in bytes. Taken from `lstat` at classification and
        /// replaced by the number of bytes actually read once the content
        /// has been streamed.
        size: u64,
        /// SHA-1 of the content; `None` until the content has been streamed
        checksum: Option<Checksum>,
    },
    /// A symbolic link, never dereferenced
    Symlink {
        /// The link target exactly as stored by the filesystem
        target: String,
    },
}

impl EntryKind {
    /// Size as recorded in the catalog; `None` for directories
    pub fn size(&self) -> Option<u64> {
        match self {
            EntryKind::Directory => None,
            EntryKind::RegularFile { size, .. } => Some(*size),
            EntryKind::Symlink { target } => Some(target.len() as u64),
        }
    }

    /// Checksum as recorded in the catalog
    ///
    /// Returns `None` only for a regular file whose content has not been
    /// streamed yet.
    pub fn checksum(&self) -> Option<Checksum> {
        match self {
            EntryKind::Directory | EntryKind::Symlink { .. } => Some(Checksum::ZERO),
            EntryKind::RegularFile { checksum, .. } => *checksum,
        }
    }

    /// Short label used in diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Directory => "directory",
            EntryKind::RegularFile { .. } => "file",
            EntryKind::Symlink { .. } => "symlink",
        }
    }
}

/// One filesystem item discovered during traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path below the source root, `/`-separated, without the root itself
    pub relative_path: String,
    /// Bare name of the item (last path segment)
    pub name: String,
    /// Absolute path used to read the item; never persisted
    #[serde(skip)]
    pub source_path: PathBuf,
    /// Raw `st_mode` including the file type bits
    pub mode: u32,
    /// Owner and group
    pub ownership: Ownership,
    /// Modification time with full precision
    pub modified: DateTime<Utc>,
    /// Kind-specific metadata
    pub kind: EntryKind,
}

impl Entry {
    /// Permission bits including setuid/setgid/sticky (`mode & 0o7777`)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Whether this entry is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Record the streamed content length and digest of a regular file
    ///
    /// Has no effect on directories and symlinks.
    pub fn record_content(&mut self, len: u64, digest: Checksum) {
        if let EntryKind::RegularFile { size, checksum } = &mut self.kind {
            *size = len;
            *checksum = Some(digest);
        }
    }
}

/// What to do when a single item cannot be archived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Log a diagnostic, leave the item (and its subtree) out, continue
    #[default]
    Skip,
    /// Halt the whole run on the first item-level failure
    Abort,
}

/// Configuration for a paxcat run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaxcatConfig {
    /// Absolute source directory
    pub source_path: PathBuf,
    /// Compressed archive output
    pub archive_path: PathBuf,
    /// Catalog output
    pub catalog_path: PathBuf,
    /// Skip or abort on item-level failures
    pub error_policy: ErrorPolicy,
    /// Number of worker threads staging file content
    pub parallel_workers: usize,
    /// Read chunk size in bytes
    pub chunk_size: usize,
    /// Capacity of each per-file handoff queue, in chunks
    pub queue_depth: usize,
    /// Bytes of file content kept in memory before staging spills to disk
    pub spool_threshold: usize,
    /// Gzip level of the archive stream
    pub compression_level: CompressionLevel,
    /// paxcat version that produced this config
    pub version: String,
}

/// An item left out of both outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Absolute path of the item
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// Result of a completed run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Directories archived (excluding the root)
    pub directories: usize,
    /// Regular files archived
    pub files: usize,
    /// Symlinks archived
    pub symlinks: usize,
    /// Total file content bytes
    pub content_bytes: u64,
    /// Uncompressed archive stream size
    pub archive_bytes: u64,
    /// Compressed archive size on disk
    pub compressed_bytes: u64,
    /// Items left out of both outputs
    pub skipped: Vec<SkippedItem>,
    /// Archive output path
    pub archive_path: PathBuf,
    /// Catalog output path
    pub catalog_path: PathBuf,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Number of entries written to both outputs
    pub fn entries(&self) -> usize {
        self.directories + self.files + self.symlinks
    }
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
    /// Total bytes to process (if known)
    pub total_bytes: Option<u64>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
