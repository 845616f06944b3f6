//! Human-readable catalog of archived items
//!
//! The catalog is a UTF-8 text file made of directory blocks. Each block
//! starts with a blank line and a line holding a single space followed by the
//! directory's path; the rows that follow describe the directory's direct
//! children, one per line, as five tab-separated fields:
//!
//! ```text
//!
//!  /srv/data
//! drwxr-xr-x	0000000000000000000000000000000000000000	N/A	2024-03-01 12:00:00	sub
//!
//!  /srv/data/sub
//! -rw-r--r--	c22b5f9178342609428d6f51b2c5af4c0bde6a42	2	2024-03-01 12:00:00	a.txt
//! lrwxrwxrwx	0000000000000000000000000000000000000000	5	2024-03-01 12:00:00	link -> a.txt
//! ```
//!
//! Fields: permission string, SHA-1 (all zeros for directories and
//! symlinks), size (`N/A` for directories, target length for symlinks),
//! local modification time without offset, and the bare name with
//! ` -> target` appended for symlinks.
//!
//! [`parse_catalog`] reads this layout back.

use crate::classify::mode_string;
use crate::error::{PaxcatError, Result, Sink};
use crate::types::{Checksum, Entry, EntryKind};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Size field written for directories
pub const SIZE_SENTINEL: &str = "N/A";

/// Layout of the modification time field
pub const MTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LINK_SEPARATOR: &str = " -> ";

/// Render a timestamp as local time, truncated to seconds, without offset
pub fn format_mtime(modified: &DateTime<Utc>) -> String {
    modified.with_timezone(&Local).format(MTIME_FORMAT).to_string()
}

/// Render one catalog row, including the trailing newline
///
/// Fails for a regular file whose content has not been streamed yet, since
/// its checksum is still unknown.
pub fn format_row(entry: &Entry) -> Result<String> {
    let checksum = entry.kind.checksum().ok_or_else(|| {
        PaxcatError::internal(format!(
            "file {} reached the catalog without a checksum",
            entry.relative_path
        ))
    })?;
    let size = match entry.kind.size() {
        Some(size) => size.to_string(),
        None => SIZE_SENTINEL.to_string(),
    };
    let name = match &entry.kind {
        EntryKind::Symlink { target } => format!("{}{}{}", entry.name, LINK_SEPARATOR, target),
        _ => entry.name.clone(),
    };

    Ok(format!(
        "{}\t{}\t{}\t{}\t{}\n",
        mode_string(entry.mode),
        checksum,
        size,
        format_mtime(&entry.modified),
        name
    ))
}

/// Appends blocks and rows to the catalog stream
pub struct CatalogWriter<W: Write> {
    writer: W,
    path: PathBuf,
    blocks: usize,
    rows: usize,
}

impl CatalogWriter<BufWriter<File>> {
    /// Create the catalog file; fails if it already exists
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| PaxcatError::sink(Sink::Catalog, path, e))?;
        Ok(Self::new(BufWriter::new(file), path))
    }

    /// Flush and fsync the catalog file
    pub fn finish_and_sync(self) -> Result<()> {
        let path = self.path.clone();
        let buffered = self.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|e| PaxcatError::sink(Sink::Catalog, &path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| PaxcatError::sink(Sink::Catalog, &path, e))
    }
}

impl<W: Write> CatalogWriter<W> {
    /// Wrap an arbitrary writer; `path` is only used in error messages
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
            blocks: 0,
            rows: 0,
        }
    }

    /// Number of block headers written
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Number of rows written
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Start the block of a directory about to be listed
    pub fn begin_block(&mut self, directory: &str) -> Result<()> {
        self.emit(&format!("\n {}\n", directory))?;
        self.blocks += 1;
        trace!("Catalog block {}", directory);
        Ok(())
    }

    /// Append the row describing `entry`
    pub fn write_row(&mut self, entry: &Entry) -> Result<()> {
        let row = format_row(entry)?;
        if row.trim_end_matches('\n').contains('\n') {
            warn!(
                "Catalog row for {:?} contains a line break; the catalog will not parse back",
                entry.relative_path
            );
        }
        self.emit(&row)?;
        self.rows += 1;
        Ok(())
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(|e| PaxcatError::sink(Sink::Catalog, &self.path, e))
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .flush()
            .map_err(|e| PaxcatError::sink(Sink::Catalog, &self.path, e))?;
        Ok(self.writer)
    }
}

/// One parsed catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    /// Ten-character permission string
    pub mode: String,
    /// Recorded checksum (zero for directories and symlinks)
    pub checksum: Checksum,
    /// Recorded size; `None` for the `N/A` sentinel
    pub size: Option<u64>,
    /// Local modification time
    pub modified: NaiveDateTime,
    /// Bare item name
    pub name: String,
    /// Symlink target, for rows whose mode starts with `l`
    pub link_target: Option<String>,
}

impl CatalogRow {
    /// Whether the row describes a directory
    pub fn is_directory(&self) -> bool {
        self.mode.starts_with('d')
    }

    /// Whether the row describes a symlink
    pub fn is_symlink(&self) -> bool {
        self.mode.starts_with('l')
    }
}

/// One parsed directory block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogBlock {
    /// Directory path as printed in the block header
    pub directory: String,
    /// Rows of the directory's direct children, in order
    pub rows: Vec<CatalogRow>,
}

fn parse_error(line: usize, message: impl Into<String>) -> PaxcatError {
    PaxcatError::CatalogParse {
        line,
        message: message.into(),
    }
}

/// Parse one row; `line` is only used for error messages
pub fn parse_row(text: &str, line: usize) -> Result<CatalogRow> {
    let fields: Vec<&str> = text.splitn(5, '\t').collect();
    if fields.len() != 5 {
        return Err(parse_error(
            line,
            format!("expected 5 tab-separated fields, found {}", fields.len()),
        ));
    }

    let mode = fields[0];
    if mode.chars().count() != 10 {
        return Err(parse_error(line, format!("bad permission string {:?}", mode)));
    }
    let checksum: Checksum = fields[1]
        .parse()
        .map_err(|e| parse_error(line, format!("bad checksum {:?}: {}", fields[1], e)))?;
    let size = match fields[2] {
        SIZE_SENTINEL => None,
        s => Some(
            s.parse::<u64>()
                .map_err(|e| parse_error(line, format!("bad size {:?}: {}", s, e)))?,
        ),
    };
    let modified = NaiveDateTime::parse_from_str(fields[3], MTIME_FORMAT)
        .map_err(|e| parse_error(line, format!("bad time {:?}: {}", fields[3], e)))?;

    let (name, link_target) = if mode.starts_with('l') {
        let (name, target) = fields[4]
            .split_once(LINK_SEPARATOR)
            .ok_or_else(|| parse_error(line, "symlink row without a target"))?;
        (name.to_string(), Some(target.to_string()))
    } else {
        (fields[4].to_string(), None)
    };

    Ok(CatalogRow {
        mode: mode.to_string(),
        checksum,
        size,
        modified,
        name,
        link_target,
    })
}

/// Parse a whole catalog into its directory blocks
///
/// Rows are read one per line. Names are written verbatim, so a catalog
/// holding a name or symlink target with a line break cannot be read back
/// and yields [`PaxcatError::CatalogParse`] at the continuation line; the
/// writer logs a warning when it emits such a row.
pub fn parse_catalog(text: &str) -> Result<Vec<CatalogBlock>> {
    let mut blocks: Vec<CatalogBlock> = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

    while let Some((number, line)) = lines.next() {
        if line.is_empty() {
            let (number, header) = lines
                .next()
                .ok_or_else(|| parse_error(number, "blank line not followed by a block header"))?;
            let directory = header
                .strip_prefix(' ')
                .ok_or_else(|| parse_error(number, "block header must start with a space"))?;
            blocks.push(CatalogBlock {
                directory: directory.to_string(),
                rows: Vec::new(),
            });
            continue;
        }

        let row = parse_row(line, number)?;
        match blocks.last_mut() {
            Some(block) => block.rows.push(row),
            None => return Err(parse_error(number, "row outside of any block")),
        }
    }

    Ok(blocks)
}
