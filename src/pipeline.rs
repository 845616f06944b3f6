//! Concurrent read/checksum/stage pipeline for regular files
//!
//! Each regular file is processed by one producer and two consumers:
//!
//! ```text
//!                         ┌──(bounded queue)──▶ checksum task ──▶ SHA-1
//! file ─▶ ChunkReader ────┤
//!                         └──(bounded queue)──▶ content task ──▶ spooled staging buffer
//! ```
//!
//! The producer reads fixed-size chunks and hands every chunk to both queues
//! in order. Chunks are reference-counted ([`Bytes`]), so both consumers see
//! the same allocation. When either queue is full the producer blocks, so a
//! slow consumer throttles reading instead of letting chunks pile up.
//!
//! Content is staged rather than written straight into the archive: the
//! archive is a single compressed stream that cannot be rewound, and a file
//! that fails mid-read must leave no trace in either output. The staging
//! buffer lives in memory up to the spool threshold and spills to an
//! anonymous temporary file beyond that.
//!
//! The file handle and both consumer tasks are scoped to [`stage_file`]; they
//! are released on every exit path, including read errors.

use crate::error::{PaxcatError, Result};
use crate::reader::{ChunkReader, DEFAULT_CHUNK_SIZE};
use crate::types::{Checksum, Entry, EntryKind};
use bytes::Bytes;
use crossbeam_channel::{bounded, Sender};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::thread;
use tempfile::SpooledTempFile;
use tracing::trace;

/// Default capacity of each handoff queue, in chunks
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Default in-memory staging limit per file (8 MiB)
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Tuning knobs of the per-file pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Read chunk size in bytes
    pub chunk_size: usize,
    /// Capacity of each handoff queue, in chunks
    pub queue_depth: usize,
    /// Bytes kept in memory before staging spills to disk
    pub spool_threshold: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

/// File content that has been read, hashed and staged, ready to commit
#[derive(Debug)]
pub struct StagedContent {
    spool: SpooledTempFile,
    len: u64,
    checksum: Checksum,
}

impl StagedContent {
    /// Number of content bytes staged
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file was empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// SHA-1 of exactly the staged bytes
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Reader over the staged bytes, positioned at the start
    pub fn into_reader(self) -> impl Read {
        self.spool
    }
}

/// An entry ready to be committed to both outputs
#[derive(Debug)]
pub struct StagedEntry {
    /// Fully populated entry (regular files carry their checksum)
    pub entry: Entry,
    /// Staged content; present only for regular files
    pub content: Option<StagedContent>,
}

/// Why the producer stopped before the end of input
enum ProduceError {
    Read(io::Error),
    ConsumerGone,
}

/// Stage an entry: stream regular file content, pass others through
pub fn stage_entry(mut entry: Entry, options: &PipelineOptions) -> Result<StagedEntry> {
    let content = match entry.kind {
        EntryKind::RegularFile { .. } => {
            let content = stage_file(&entry.source_path, options)?;
            entry.record_content(content.len(), content.checksum());
            Some(content)
        }
        EntryKind::Directory | EntryKind::Symlink { .. } => None,
    };
    Ok(StagedEntry { entry, content })
}

/// Open `path`, then read, hash and stage its content concurrently
pub fn stage_file(path: &Path, options: &PipelineOptions) -> Result<StagedContent> {
    let file = File::open(path).map_err(|source| PaxcatError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    stage_chunks(path, ChunkReader::new(file, options.chunk_size), options)
}

/// Run the producer/two-consumer pipeline over an arbitrary chunk source
pub fn stage_chunks<I>(path: &Path, chunks: I, options: &PipelineOptions) -> Result<StagedContent>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    let depth = options.queue_depth.max(1);
    let threshold = options.spool_threshold;
    let (hash_tx, hash_rx) = bounded::<Bytes>(depth);
    let (data_tx, data_rx) = bounded::<Bytes>(depth);

    thread::scope(|scope| {
        let hasher = scope.spawn(move || {
            let mut hasher = Sha1::new();
            for chunk in hash_rx.iter() {
                hasher.update(&chunk);
            }
            let mut digest = [0u8; 20];
            digest.copy_from_slice(&hasher.finalize());
            Checksum(digest)
        });

        let writer = scope.spawn(move || -> io::Result<(SpooledTempFile, u64)> {
            let mut spool = tempfile::spooled_tempfile(threshold);
            let mut written = 0u64;
            for chunk in data_rx.iter() {
                spool.write_all(&chunk)?;
                written += chunk.len() as u64;
            }
            spool.flush()?;
            spool.rewind()?;
            Ok((spool, written))
        });

        let produced = produce(chunks, &hash_tx, &data_tx);
        drop(hash_tx);
        drop(data_tx);

        let checksum = hasher
            .join()
            .map_err(|_| PaxcatError::internal("checksum task panicked"))?;
        let staged = writer
            .join()
            .map_err(|_| PaxcatError::internal("content task panicked"))?;

        let (spool, len) = staged.map_err(|source| PaxcatError::Staging {
            path: path.to_path_buf(),
            source,
        })?;

        match produced {
            Ok(read) if read == len => {
                trace!(
                    "Staged {} bytes of {:?} (spilled: {})",
                    len,
                    path,
                    spool.is_rolled()
                );
                Ok(StagedContent { spool, len, checksum })
            }
            Ok(read) => Err(PaxcatError::internal(format!(
                "staged {} of {} bytes read from {:?}",
                len, read, path
            ))),
            Err(ProduceError::Read(source)) => Err(PaxcatError::Read {
                path: path.to_path_buf(),
                source,
            }),
            Err(ProduceError::ConsumerGone) => Err(PaxcatError::internal(format!(
                "a consumer of {:?} stopped early",
                path
            ))),
        }
    })
}

/// Feed every chunk to both consumers, in order; returns bytes produced
fn produce<I>(
    chunks: I,
    hash_tx: &Sender<Bytes>,
    data_tx: &Sender<Bytes>,
) -> std::result::Result<u64, ProduceError>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    let mut total = 0u64;
    for chunk in chunks {
        let chunk = chunk.map_err(ProduceError::Read)?;
        total += chunk.len() as u64;
        hash_tx
            .send(chunk.clone())
            .map_err(|_| ProduceError::ConsumerGone)?;
        data_tx.send(chunk).map_err(|_| ProduceError::ConsumerGone)?;
    }
    Ok(total)
}
