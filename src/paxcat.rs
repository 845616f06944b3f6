//! Run orchestration
//!
//! [`Paxcat`] ties the pieces together: it validates the source directory and
//! the output location, derives the two output paths from a prefix, creates
//! both output files and hands them to the traversal engine.
//!
//! All precondition checks happen in [`PaxcatBuilder::build`], before any
//! output file exists. Once [`Paxcat::run`] has created the outputs, a fatal
//! error leaves them behind as partial, unusable files; the error says so
//! (see [`PaxcatError::user_message`]).

use crate::archive::ArchiveWriter;
use crate::catalog::CatalogWriter;
use crate::compression::CompressionLevel;
use crate::error::{PaxcatError, Result};
use crate::pipeline::{PipelineOptions, DEFAULT_QUEUE_DEPTH, DEFAULT_SPOOL_THRESHOLD};
use crate::reader::DEFAULT_CHUNK_SIZE;
use crate::traversal::{Traversal, TraversalOptions};
use crate::types::{ErrorPolicy, PaxcatConfig, ProgressCallback, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};

/// Suffix of the compressed archive
pub const ARCHIVE_SUFFIX: &str = "pax.gz";

/// Suffix of the catalog
pub const CATALOG_SUFFIX: &str = "txt";

/// Smallest accepted read chunk size
pub const MIN_CHUNK_SIZE: usize = 512;

/// The two files a run produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `<prefix>.pax.gz`
    pub archive: PathBuf,
    /// `<prefix>.txt`
    pub catalog: PathBuf,
}

impl OutputPaths {
    /// Derive both output paths from a prefix
    ///
    /// The prefix's parent directory must exist. Any extension on the
    /// prefix name is replaced, so `backup.old` yields `backup.pax.gz` and
    /// `backup.txt`. The parent is canonicalized.
    pub fn from_prefix(prefix: &Path) -> Result<Self> {
        let name = prefix.file_name().ok_or_else(|| {
            PaxcatError::precondition(format!("Output prefix {:?} has no file name", prefix))
        })?;
        let parent = match prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let parent = parent.canonicalize().map_err(|e| {
            PaxcatError::precondition(format!("Output directory {:?} is not accessible: {}", parent, e))
        })?;
        if !parent.is_dir() {
            return Err(PaxcatError::precondition(format!(
                "Output location {:?} is not a directory",
                parent
            )));
        }

        let base = parent.join(name);
        Ok(Self {
            archive: base.with_extension(ARCHIVE_SUFFIX),
            catalog: base.with_extension(CATALOG_SUFFIX),
        })
    }

    fn ensure_absent(&self) -> Result<()> {
        for path in [&self.archive, &self.catalog] {
            if path.symlink_metadata().is_ok() {
                return Err(PaxcatError::precondition(format!(
                    "Output file {:?} already exists",
                    path
                )));
            }
        }
        Ok(())
    }
}

/// Check the source directory and return its canonical form
fn resolve_source(source: &Path) -> Result<PathBuf> {
    let resolved = source.canonicalize().map_err(|e| {
        PaxcatError::precondition(format!("Source {:?} is not accessible: {}", source, e))
    })?;
    if !resolved.is_dir() {
        return Err(PaxcatError::precondition(format!(
            "Source {:?} is not a directory",
            source
        )));
    }
    if resolved.to_str().is_none() {
        return Err(PaxcatError::precondition(format!(
            "Source {:?} is not valid UTF-8",
            source
        )));
    }
    fs::read_dir(&resolved).map_err(|e| {
        PaxcatError::precondition(format!("Source {:?} cannot be listed: {}", source, e))
    })?;
    Ok(resolved)
}

/// A configured, validated archiving run
///
/// # Examples
///
/// ```rust,no_run
/// use paxcat::{ErrorPolicy, PaxcatBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let summary = PaxcatBuilder::new()
///     .error_policy(ErrorPolicy::Abort)
///     .parallel_workers(4)
///     .build("/srv/data", "/backups/data-2024")?
///     .run()?;
///
/// println!("{} entries, {} skipped", summary.entries(), summary.skipped.len());
/// # Ok(())
/// # }
/// ```
pub struct Paxcat {
    config: PaxcatConfig,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for Paxcat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paxcat")
            .field("config", &self.config)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Paxcat {
    /// Validate `source` and `output_prefix` with default settings
    pub fn new(source: impl AsRef<Path>, output_prefix: impl AsRef<Path>) -> Result<Self> {
        PaxcatBuilder::new().build(source, output_prefix)
    }

    /// Effective configuration
    pub fn config(&self) -> &PaxcatConfig {
        &self.config
    }

    /// Archive and catalog the source tree
    ///
    /// # Errors
    ///
    /// - an output file appeared since [`PaxcatBuilder::build`] ran
    /// - writing either output failed (disk full, broken pipe)
    /// - the source root could no longer be listed
    /// - an item failed under [`ErrorPolicy::Abort`]
    #[instrument(skip(self), fields(source = ?self.config.source_path))]
    pub fn run(self) -> Result<RunSummary> {
        let config = self.config;
        let start = Instant::now();
        info!(
            "Archiving {:?} into {:?} and {:?}",
            config.source_path, config.archive_path, config.catalog_path
        );

        let mut archive = ArchiveWriter::create(&config.archive_path, config.compression_level)?;
        let mut catalog = CatalogWriter::create(&config.catalog_path)?;

        let options = TraversalOptions {
            error_policy: config.error_policy,
            parallel_workers: config.parallel_workers,
            pipeline: PipelineOptions {
                chunk_size: config.chunk_size,
                queue_depth: config.queue_depth,
                spool_threshold: config.spool_threshold,
            },
            excluded: vec![config.archive_path.clone(), config.catalog_path.clone()],
        };
        let mut traversal = Traversal::new(&config.source_path, options)?;
        if let Some(callback) = self.progress_callback {
            traversal = traversal.with_progress(callback);
        }

        let mut summary = traversal.run(&mut archive, &mut catalog)?;

        let stats = archive.finish_and_sync()?;
        catalog.finish_and_sync()?;

        summary.archive_bytes = stats.bytes_in;
        summary.compressed_bytes = stats.bytes_out;
        summary.archive_path = config.archive_path;
        summary.catalog_path = config.catalog_path;
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Archived {} entries ({} directories, {} files, {} symlinks), {} skipped, in {} ms",
            summary.entries(),
            summary.directories,
            summary.files,
            summary.symlinks,
            summary.skipped.len(),
            summary.duration_ms
        );
        Ok(summary)
    }
}

/// Builder for [`Paxcat`] runs
///
/// # Examples
///
/// ```rust
/// use paxcat::{CompressionLevel, ErrorPolicy, PaxcatBuilder};
///
/// let builder = PaxcatBuilder::new()
///     .error_policy(ErrorPolicy::Skip)
///     .compression_level(CompressionLevel::FAST)
///     .chunk_size(1024 * 1024);
/// ```
pub struct PaxcatBuilder {
    error_policy: ErrorPolicy,
    parallel_workers: usize,
    chunk_size: usize,
    queue_depth: usize,
    spool_threshold: usize,
    compression_level: CompressionLevel,
    progress_callback: Option<ProgressCallback>,
}

impl Default for PaxcatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaxcatBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            parallel_workers: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            compression_level: CompressionLevel::default(),
            progress_callback: None,
        }
    }

    /// Skip failing items (default) or abort the run on the first one
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set number of parallel workers
    ///
    /// Defaults to the number of CPU cores; values less than 1 become 1.
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = count.max(1);
        self
    }

    /// Read chunk size in bytes (at least 512)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Capacity of each per-file handoff queue (at least 1)
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Bytes of one file kept in memory before staging spills to disk
    ///
    /// Up to `2 * parallel_workers` files are staged at once, so this also
    /// bounds peak memory.
    pub fn spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Gzip level of the archive
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    /// Called after every entry committed to both outputs
    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check preconditions and build a run
    ///
    /// # Errors
    ///
    /// Returns [`PaxcatError::Precondition`] if:
    /// - the source does not exist or is not a directory
    /// - the output directory does not exist
    /// - the output directory is the source directory
    /// - either output file already exists
    pub fn build(self, source: impl AsRef<Path>, output_prefix: impl AsRef<Path>) -> Result<Paxcat> {
        let source_path = resolve_source(source.as_ref())?;
        let outputs = OutputPaths::from_prefix(output_prefix.as_ref())?;

        if outputs.archive.parent() == Some(source_path.as_path()) {
            return Err(PaxcatError::precondition(format!(
                "Output directory must differ from the source directory {:?}",
                source_path
            )));
        }
        outputs.ensure_absent()?;

        let config = PaxcatConfig {
            source_path,
            archive_path: outputs.archive,
            catalog_path: outputs.catalog,
            error_policy: self.error_policy,
            parallel_workers: self.parallel_workers,
            chunk_size: self.chunk_size,
            queue_depth: self.queue_depth,
            spool_threshold: self.spool_threshold,
            compression_level: self.compression_level,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Ok(Paxcat {
            config,
            progress_callback: self.progress_callback,
        })
    }
}
