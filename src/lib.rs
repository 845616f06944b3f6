//! # Paxcat - Archive a directory tree with a matching catalog
//!
//! Paxcat walks a directory tree and writes two artifacts in lock-step:
//!
//! - a gzip-compressed POSIX.1-2001 (PAX) tar archive holding every
//!   directory, regular file and symbolic link below the root;
//! - a human-readable, tab-separated catalog describing the same items in the
//!   same order: permission string, SHA-1 of the content, size, modification
//!   time and name (with the link target for symlinks).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paxcat::Paxcat;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Writes /backups/data.pax.gz and /backups/data.txt
//! let summary = Paxcat::new("/srv/data", "/backups/data")?.run()?;
//! println!(
//!     "{} directories, {} files, {} symlinks",
//!     summary.directories, summary.files, summary.symlinks
//! );
//! for skipped in &summary.skipped {
//!     eprintln!("skipped {:?}: {}", skipped.path, skipped.reason);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Traversal** ([`traversal`]): sorted, pre-order depth-first walk over
//!   directory blocks; never follows symlinks
//! - **Classification** ([`classify`]): `lstat`-based typing, `ls -l` mode
//!   strings, owner/group name resolution
//! - **Per-file pipeline** ([`reader`], [`pipeline`]): one reader feeding a
//!   checksum task and a content task over bounded queues
//! - **Archive encoder** ([`archive`], [`compression`]): PAX headers and
//!   content blocks through a streaming gzip filter
//! - **Catalog** ([`catalog`]): block headers and rows, plus a parser
//!
//! Regular files are staged on a worker pool; both outputs are written by a
//! single thread in listing order, so the archive entry sequence and the
//! catalog row sequence are always identical.
//!
//! ## Error Handling
//!
//! Items that cannot be archived (devices, FIFOs, sockets, unreadable files
//! or directories, names that are not UTF-8) are skipped with a warning by
//! default, or abort the run under [`ErrorPolicy::Abort`]. A skipped item
//! never leaves a trace in either output. Failures writing the outputs are
//! always fatal.
//!
//! ## Module Organization
//!
//! - [`paxcat`]: [`Paxcat`] and [`PaxcatBuilder`], preconditions, output paths
//! - [`types`]: entries, configuration, run summary
//! - [`error`]: [`PaxcatError`] and the item-level/fatal split

#[cfg(not(unix))]
compile_error!("paxcat reads POSIX metadata and only builds on unix targets");

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod compression;
pub mod error;
pub mod paxcat;
pub mod pipeline;
pub mod reader;
pub mod traversal;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use catalog::{parse_catalog, CatalogBlock, CatalogRow};
pub use compression::CompressionLevel;
pub use error::{PaxcatError, Result};
pub use paxcat::{OutputPaths, Paxcat, PaxcatBuilder};
pub use types::*;
