//! PAX archive encoder
//!
//! Serializes committed entries into a POSIX.1-2001 (PAX) tar stream that is
//! gzip-compressed on the fly. Each entry becomes:
//!
//! 1. a PAX extended header (`x` record) carrying values that do not fit the
//!    ustar fields, plus the full-precision modification time;
//! 2. a ustar header block;
//! 3. for regular files only, the content padded to 512-byte blocks.
//!
//! Directories and symlinks never have content blocks; a symlink's target is
//! carried in the header (`linkname`, or a `linkpath` record). Checksums are
//! never written to the archive.
//!
//! Names and link targets are copied into the header byte for byte. Nothing
//! is normalized, so a target such as `./a//b` survives unchanged.

use crate::compression::{CompressedWriter, CompressionLevel, CompressionStats};
use crate::error::{PaxcatError, Result, Sink};
use crate::pipeline::StagedContent;
use crate::types::{Entry, EntryKind};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::{debug, trace};

const USTAR_NAME_LEN: usize = 100;
const USTAR_PREFIX_LEN: usize = 155;
const USTAR_LINKNAME_LEN: usize = 100;
const USTAR_OWNER_NAME_LEN: usize = 32;
const USTAR_MAX_ID: u64 = 0o7777777;
const USTAR_MAX_SIZE: u64 = 0o77777777777;

/// PAX extended header records for one entry, as `(keyword, value)` pairs
pub type PaxRecords = Vec<(&'static str, String)>;

/// Format a timestamp as a PAX decimal, trimming trailing zeros
pub fn format_pax_time(secs: i64, nanos: u32) -> String {
    if nanos == 0 {
        return secs.to_string();
    }
    // secs is floored, so negative times with a fraction round toward zero
    let (sign, whole, frac) = if secs < 0 {
        ("-", (secs + 1).unsigned_abs(), 1_000_000_000 - nanos)
    } else {
        ("", secs as u64, nanos)
    };
    let frac = format!("{:09}", frac);
    format!("{}{}.{}", sign, whole, frac.trim_end_matches('0'))
}

/// Name of the entry inside the archive; directories get a trailing `/`
pub fn archive_name(entry: &Entry) -> String {
    if entry.is_directory() {
        format!("{}/", entry.relative_path)
    } else {
        entry.relative_path.clone()
    }
}

/// Try to place `name` into the ustar name/prefix fields
fn fits_ustar_name(header: &mut Header, name: &[u8]) -> bool {
    if name.len() <= USTAR_NAME_LEN {
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        return true;
    }
    if name.len() > USTAR_PREFIX_LEN + 1 + USTAR_NAME_LEN {
        return false;
    }

    // Split at the last '/' that keeps the prefix within its field and
    // leaves a non-empty name that fits.
    let split = name
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'/' && i <= USTAR_PREFIX_LEN)
        .map(|(i, _)| i)
        .filter(|&i| {
            let rest = name.len() - i - 1;
            rest > 0 && rest <= USTAR_NAME_LEN
        })
        .last();

    match (split, header.as_ustar_mut()) {
        (Some(i), Some(ustar)) => {
            ustar.prefix[..i].copy_from_slice(&name[..i]);
            ustar.name[..name.len() - i - 1].copy_from_slice(&name[i + 1..]);
            true
        }
        _ => false,
    }
}

fn copy_truncated(field: &mut [u8], value: &[u8]) {
    let n = value.len().min(field.len());
    field[..n].copy_from_slice(&value[..n]);
}

/// Build the ustar header and the PAX records for an entry
///
/// `content_len` is the number of content bytes that will follow (regular
/// files only; ignored otherwise).
pub fn build_header(entry: &Entry, content_len: u64) -> (Header, PaxRecords) {
    let mut header = Header::new_ustar();
    let mut records = Vec::new();

    let name = archive_name(entry);
    if !name.is_ascii() || !fits_ustar_name(&mut header, name.as_bytes()) {
        copy_truncated(&mut header.as_old_mut().name, name.as_bytes());
        records.push(("path", name.clone()));
    }

    let (entry_type, size) = match &entry.kind {
        EntryKind::Directory => (EntryType::Directory, 0),
        EntryKind::RegularFile { .. } => (EntryType::Regular, content_len),
        EntryKind::Symlink { target } => {
            let bytes = target.as_bytes();
            if target.is_ascii() && bytes.len() <= USTAR_LINKNAME_LEN {
                header.as_old_mut().linkname[..bytes.len()].copy_from_slice(bytes);
            } else {
                copy_truncated(&mut header.as_old_mut().linkname, bytes);
                records.push(("linkpath", target.clone()));
            }
            (EntryType::Symlink, 0)
        }
    };
    header.set_entry_type(entry_type);
    header.set_mode(entry.permissions());

    let secs = entry.modified.timestamp();
    header.set_mtime(secs.max(0) as u64);
    records.push((
        "mtime",
        format_pax_time(secs, entry.modified.timestamp_subsec_nanos()),
    ));

    let uid = entry.ownership.uid as u64;
    let gid = entry.ownership.gid as u64;
    header.set_uid(uid.min(USTAR_MAX_ID));
    header.set_gid(gid.min(USTAR_MAX_ID));
    if uid > USTAR_MAX_ID {
        records.push(("uid", uid.to_string()));
    }
    if gid > USTAR_MAX_ID {
        records.push(("gid", gid.to_string()));
    }

    if let Some(ustar) = header.as_ustar_mut() {
        for (key, value, field) in [
            ("uname", &entry.ownership.user, &mut ustar.uname),
            ("gname", &entry.ownership.group, &mut ustar.gname),
        ] {
            if let Some(value) = value {
                if value.is_ascii() && value.len() <= USTAR_OWNER_NAME_LEN {
                    field[..value.len()].copy_from_slice(value.as_bytes());
                } else {
                    copy_truncated(field, value.as_bytes());
                    records.push((key, value.clone()));
                }
            }
        }
    }

    header.set_size(size.min(USTAR_MAX_SIZE));
    if size > USTAR_MAX_SIZE {
        records.push(("size", size.to_string()));
    }

    header.set_cksum();
    (header, records)
}

/// Writes entries into a gzip-compressed PAX archive
///
/// The writer is the only owner of the archive stream; entries are appended
/// strictly in the order [`ArchiveWriter::append`] is called.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<CompressedWriter<W>>,
    path: PathBuf,
    entries: usize,
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create the archive file; fails if it already exists
    pub fn create(path: &Path, level: CompressionLevel) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| PaxcatError::sink(Sink::Archive, path, e))?;
        Ok(Self::new(BufWriter::with_capacity(1 << 20, file), path, level))
    }

    /// Finish the archive and fsync the file
    pub fn finish_and_sync(self) -> Result<CompressionStats> {
        let path = self.path.clone();
        let (buffered, stats) = self.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|e| PaxcatError::sink(Sink::Archive, &path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| PaxcatError::sink(Sink::Archive, &path, e))?;
        Ok(stats)
    }
}

impl<W: Write> ArchiveWriter<W> {
    /// Wrap an arbitrary writer; `path` is only used in error messages
    pub fn new(writer: W, path: impl Into<PathBuf>, level: CompressionLevel) -> Self {
        let mut builder = tar::Builder::new(CompressedWriter::new(writer, level));
        builder.mode(tar::HeaderMode::Complete);
        Self {
            builder,
            path: path.into(),
            entries: 0,
        }
    }

    /// Number of entries appended so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Uncompressed bytes emitted so far
    pub fn raw_bytes(&self) -> u64 {
        self.builder.get_ref().stats().bytes_in
    }

    /// Append one entry; regular files must come with their staged content
    pub fn append(&mut self, entry: &Entry, content: Option<StagedContent>) -> Result<()> {
        let content_len = match (&entry.kind, &content) {
            (EntryKind::RegularFile { .. }, Some(content)) => content.len(),
            (EntryKind::RegularFile { .. }, None) => {
                return Err(PaxcatError::internal(format!(
                    "file {} committed without staged content",
                    entry.relative_path
                )))
            }
            (_, Some(_)) => {
                return Err(PaxcatError::internal(format!(
                    "{} {} committed with content",
                    entry.kind.label(),
                    entry.relative_path
                )))
            }
            (_, None) => 0,
        };

        let (header, records) = build_header(entry, content_len);
        self.write(&header, &records, content)
            .map_err(|e| PaxcatError::sink(Sink::Archive, &self.path, e))?;

        self.entries += 1;
        trace!(
            "Archived {} ({}, {} bytes)",
            entry.relative_path,
            entry.kind.label(),
            content_len
        );
        Ok(())
    }

    fn write(
        &mut self,
        header: &Header,
        records: &[(&'static str, String)],
        content: Option<StagedContent>,
    ) -> io::Result<()> {
        // an empty record list writes no `x` header
        self.builder
            .append_pax_extensions(records.iter().map(|(key, value)| (*key, value.as_bytes())))?;
        match content {
            Some(content) => self.builder.append(header, content.into_reader()),
            None => self.builder.append(header, io::empty()),
        }
    }

    /// Write the end-of-archive marker and the gzip trailer
    pub fn finish(self) -> Result<(W, CompressionStats)> {
        let path = self.path;
        let entries = self.entries;
        let compressed = self
            .builder
            .into_inner()
            .map_err(|e| PaxcatError::sink(Sink::Archive, &path, e))?;
        let (writer, stats) = compressed
            .finish()
            .map_err(|e| PaxcatError::sink(Sink::Archive, &path, e))?;
        debug!("Finished archive {:?} with {} entries", path, entries);
        Ok((writer, stats))
    }
}
