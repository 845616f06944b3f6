//! Fixed-size chunk source for regular file content
//!
//! [`ChunkReader`] turns any reader into a lazy, finite, ordered sequence of
//! chunks. Every chunk except the last is exactly `chunk_size` bytes; short
//! reads from the underlying reader are coalesced, so chunk boundaries do not
//! depend on how the kernel happens to split reads.

use bytes::{Bytes, BytesMut};
use std::io::{self, Read};

/// Default chunk size used by the file pipeline (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Iterator over fixed-size chunks of a reader
///
/// Yields `Err` at most once; after an error or end of input the iterator
/// is exhausted.
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    reader: R,
    chunk_size: usize,
    bytes_read: u64,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Create a chunk reader; `chunk_size` is clamped to at least 1
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            bytes_read: 0,
            done: false,
        }
    }

    /// Total bytes yielded so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn fill_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        while filled < self.chunk_size {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(Some(buf.freeze()))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill_chunk() {
            Ok(Some(chunk)) => {
                if chunk.len() < self.chunk_size {
                    self.done = true;
                }
                Some(Ok(chunk))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
