//! Streaming gzip compression for the archive stream
//!
//! The whole archive (every header and content block, in traversal order) is
//! passed through a single gzip stream. Compression is a streaming filter: the
//! raw archive is never materialized, bytes are compressed as the encoder
//! emits them.
//!
//! ## Compression Levels
//!
//! - [`CompressionLevel::BEST`] (level 9, default): maximum ratio
//! - [`CompressionLevel::FAST`] (level 1): cheapest CPU
//! - any level from 0 (stored) to 9 via [`CompressionLevel::new`]
//!
//! ## Examples
//!
//! ```rust
//! use paxcat::compression::{CompressedWriter, CompressionLevel};
//! use std::io::Write;
//!
//! let mut writer = CompressedWriter::new(Vec::new(), CompressionLevel::BEST);
//! writer.write_all(b"Hello, world! Hello, world! Hello, world!").unwrap();
//! let (compressed, stats) = writer.finish().unwrap();
//!
//! assert_eq!(stats.bytes_in, 41);
//! assert_eq!(stats.bytes_out, compressed.len() as u64);
//! ```

use crate::error::{PaxcatError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Instant;
use tracing::debug;

/// Gzip compression level (0-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// Maximum compression ratio
    pub const BEST: CompressionLevel = CompressionLevel(9);
    /// Fastest compression
    pub const FAST: CompressionLevel = CompressionLevel(1);

    /// Create a level, rejecting values above 9
    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(PaxcatError::InvalidConfiguration(format!(
                "compression level {} is out of range 0-9",
                level
            )));
        }
        Ok(CompressionLevel(level))
    }

    /// Numeric level
    pub fn level(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::BEST
    }
}

/// Compression statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct CompressionStats {
    /// Uncompressed bytes written into the stream
    pub bytes_in: u64,
    /// Compressed bytes emitted to the underlying writer
    pub bytes_out: u64,
    /// Wall time between creation and finish in milliseconds
    pub compression_time_ms: u64,
}

impl CompressionStats {
    /// Compressed size as a fraction of the input size
    ///
    /// Returns 0.0 when nothing was written.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        self.bytes_out as f64 / self.bytes_in as f64
    }
}

/// Counts bytes passing through to the wrapped writer
#[derive(Debug)]
struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writer that gzip-compresses everything written to it
///
/// Call [`CompressedWriter::finish`] to write the gzip trailer; dropping the
/// writer without finishing leaves a truncated stream.
#[derive(Debug)]
pub struct CompressedWriter<W: Write> {
    encoder: GzEncoder<CountingWriter<W>>,
    bytes_in: u64,
    started: Instant,
}

impl<W: Write> CompressedWriter<W> {
    /// Create a new compressed writer
    pub fn new(writer: W, level: CompressionLevel) -> Self {
        let counting = CountingWriter { inner: writer, count: 0 };
        Self {
            encoder: GzEncoder::new(counting, Compression::new(level.level())),
            bytes_in: 0,
            started: Instant::now(),
        }
    }

    /// Get compression statistics so far
    ///
    /// `bytes_out` lags behind until the encoder flushes its window.
    pub fn stats(&self) -> CompressionStats {
        CompressionStats {
            bytes_in: self.bytes_in,
            bytes_out: self.encoder.get_ref().count,
            compression_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Finish the gzip stream and return the underlying writer and stats
    pub fn finish(self) -> io::Result<(W, CompressionStats)> {
        let bytes_in = self.bytes_in;
        let started = self.started;
        let mut counting = self.encoder.finish()?;
        counting.flush()?;

        let stats = CompressionStats {
            bytes_in,
            bytes_out: counting.count,
            compression_time_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            "Compressed {} -> {} bytes ({:.1}%) in {} ms",
            stats.bytes_in,
            stats.bytes_out,
            stats.compression_ratio() * 100.0,
            stats.compression_time_ms
        );

        Ok((counting.inner, stats))
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.encoder.write(buf)?;
        self.bytes_in += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}
