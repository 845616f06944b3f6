//! Traversal engine
//!
//! Walks the source tree and drives both outputs. The walk is a pre-order
//! depth-first traversal over directory *blocks*:
//!
//! 1. list the directory's children, sorted byte-wise by name;
//! 2. write the catalog block header;
//! 3. classify every child and stage regular files on the worker pool;
//! 4. commit the children to the archive and the catalog, strictly in
//!    listing order;
//! 5. descend into the child directories, first name first, each fully
//!    before its next sibling.
//!
//! Staging (read + checksum + buffering) runs in parallel, in windows of
//! `2 * workers` entries. Committing is done on the calling thread only, so
//! each output stream has exactly one writer and both see the same entry
//! sequence.
//!
//! Symlinks are never followed. Items that cannot be archived are handled
//! according to the configured [`ErrorPolicy`].

use crate::archive::ArchiveWriter;
use crate::catalog::CatalogWriter;
use crate::classify::Classifier;
use crate::error::{PaxcatError, Result};
use crate::pipeline::{stage_entry, PipelineOptions, StagedEntry};
use crate::types::{
    Entry, EntryKind, ErrorPolicy, ProgressCallback, ProgressInfo, RunSummary, SkippedItem,
};
use crate::utils::join_relative;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Settings of a traversal
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Skip or abort on item-level failures
    pub error_policy: ErrorPolicy,
    /// Worker threads used for staging
    pub parallel_workers: usize,
    /// Per-file pipeline tuning
    pub pipeline: PipelineOptions,
    /// Absolute paths never visited: the run's own output files
    ///
    /// Also named in the error when the root cannot be listed.
    pub excluded: Vec<PathBuf>,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Skip,
            parallel_workers: num_cpus::get(),
            pipeline: PipelineOptions::default(),
            excluded: Vec::new(),
        }
    }
}

/// A listed child, or the failure to stat it
type Listed = std::result::Result<PathBuf, (PathBuf, PaxcatError)>;

/// A directory waiting for its block
struct PendingDir {
    path: PathBuf,
    relative_path: String,
}

/// Per-entry staging step run on the worker pool
pub type Stager = fn(Entry, &PipelineOptions) -> Result<StagedEntry>;

/// Drives classification, staging and commit over one source tree
pub struct Traversal {
    root: PathBuf,
    options: TraversalOptions,
    classifier: Classifier,
    pool: rayon::ThreadPool,
    stager: Stager,
    progress: Option<ProgressCallback>,
    summary: RunSummary,
}

impl Traversal {
    /// Create an engine for `root`, which must be an absolute directory path
    pub fn new(root: impl Into<PathBuf>, options: TraversalOptions) -> Result<Self> {
        let workers = options.parallel_workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("paxcat-worker-{index}"))
            .build()
            .map_err(|e| PaxcatError::ThreadPool(e.to_string()))?;

        Ok(Self {
            root: root.into(),
            options,
            classifier: Classifier::new(),
            pool,
            stager: stage_entry,
            progress: None,
            summary: RunSummary::default(),
        })
    }

    /// Report every committed entry to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Replace the staging step; defaults to [`stage_entry`]
    pub fn with_stager(mut self, stager: Stager) -> Self {
        self.stager = stager;
        self
    }

    fn window(&self) -> usize {
        2 * self.pool.current_num_threads().max(1)
    }

    /// Walk the tree, writing every entry to both sinks
    ///
    /// Returns the entry counts and skipped items; output paths, byte totals
    /// and timing are left for the caller to fill in.
    pub fn run<A: Write, C: Write>(
        mut self,
        archive: &mut ArchiveWriter<A>,
        catalog: &mut CatalogWriter<C>,
    ) -> Result<RunSummary> {
        let mut stack = vec![PendingDir {
            path: self.root.clone(),
            relative_path: String::new(),
        }];

        while let Some(dir) = stack.pop() {
            let is_root = dir.relative_path.is_empty();
            let children = match self.list(&dir.path) {
                Ok(children) => children,
                // Nothing can be archived without the root listing
                Err(PaxcatError::Enumerate { path, source }) if is_root => {
                    return Err(PaxcatError::RootUnlisted {
                        path,
                        source,
                        outputs: self.options.excluded.clone(),
                    })
                }
                Err(e) if is_root => return Err(e),
                Err(e) => {
                    self.skip_or_abort(&dir.path, e)?;
                    continue;
                }
            };

            catalog.begin_block(&self.block_header(&dir.relative_path))?;
            debug!("Listing {:?}: {} children", dir.path, children.len());

            let mut entries = Vec::with_capacity(children.len());
            for child in children {
                let path = match child {
                    Ok(path) => path,
                    Err((path, e)) => {
                        self.skip_or_abort(&path, e)?;
                        continue;
                    }
                };
                match self.classify_child(&path, &dir.relative_path) {
                    Ok(Some(entry)) => entries.push(entry),
                    Ok(None) => {}
                    Err(e) => self.skip_or_abort(&path, e)?,
                }
            }

            let mut subdirs = Vec::new();
            while !entries.is_empty() {
                let take = self.window().min(entries.len());
                let batch: Vec<Entry> = entries.drain(..take).collect();
                let pipeline = self.options.pipeline;
                let stager = self.stager;

                let staged: Vec<(PathBuf, Result<StagedEntry>)> = self.pool.install(|| {
                    batch
                        .into_par_iter()
                        .map(|entry| (entry.source_path.clone(), stager(entry, &pipeline)))
                        .collect()
                });

                for (path, result) in staged {
                    match result {
                        Ok(staged) => {
                            if staged.entry.is_directory() {
                                subdirs.push(PendingDir {
                                    path: staged.entry.source_path.clone(),
                                    relative_path: staged.entry.relative_path.clone(),
                                });
                            }
                            self.commit(staged, archive, catalog)?;
                        }
                        Err(e) => self.skip_or_abort(&path, e)?,
                    }
                }
            }

            // Reversed so the first child directory is popped first
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(self.summary)
    }

    /// List the children of `dir` in byte-wise name order
    ///
    /// The outer error means the directory itself could not be read; inner
    /// errors concern single children.
    fn list(&self, dir: &Path) -> Result<Vec<Listed>> {
        let mut children = Vec::new();
        for item in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            match item {
                Ok(item) => children.push(Ok(item.into_path())),
                Err(e) => {
                    let child = e.path().filter(|p| e.depth() > 0 && *p != dir).map(Path::to_path_buf);
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    match child {
                        Some(path) => children.push(Err((
                            path.clone(),
                            PaxcatError::Metadata { path, source },
                        ))),
                        None => {
                            return Err(PaxcatError::Enumerate {
                                path: dir.to_path_buf(),
                                source,
                            })
                        }
                    }
                }
            }
        }
        Ok(children)
    }

    /// Classify one listed child; `None` for excluded paths
    fn classify_child(&self, path: &Path, parent_relative: &str) -> Result<Option<Entry>> {
        if self.options.excluded.iter().any(|excluded| excluded == path) {
            debug!("Not archiving output file {:?}", path);
            return Ok(None);
        }

        let name = path
            .file_name()
            .ok_or_else(|| PaxcatError::internal(format!("{:?} has no file name", path)))?;
        let name = name
            .to_str()
            .ok_or_else(|| PaxcatError::PathConversion(name.to_os_string()))?;
        let relative_path = join_relative(parent_relative, name);

        let entry = self.classifier.classify(path, &relative_path)?;
        if entry.is_directory() {
            // An unreadable directory is left out together with its subtree
            fs::read_dir(path).map_err(|source| PaxcatError::Enumerate {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(Some(entry))
    }

    /// Write one staged entry to both outputs
    fn commit<A: Write, C: Write>(
        &mut self,
        staged: StagedEntry,
        archive: &mut ArchiveWriter<A>,
        catalog: &mut CatalogWriter<C>,
    ) -> Result<()> {
        let StagedEntry { entry, content } = staged;

        archive.append(&entry, content)?;
        catalog.write_row(&entry)?;

        match &entry.kind {
            EntryKind::Directory => self.summary.directories += 1,
            EntryKind::RegularFile { size, .. } => {
                self.summary.files += 1;
                self.summary.content_bytes += size;
            }
            EntryKind::Symlink { .. } => self.summary.symlinks += 1,
        }
        trace!("Committed {}", entry.relative_path);

        if let Some(ref callback) = self.progress {
            callback(ProgressInfo {
                operation: "Archiving".to_string(),
                current_item: Some(entry.relative_path.clone()),
                processed: self.summary.entries(),
                total: None,
                bytes_processed: self.summary.content_bytes,
                total_bytes: None,
            });
        }
        Ok(())
    }

    /// Apply the error policy to a failure concerning `path`
    fn skip_or_abort(&mut self, path: &Path, err: PaxcatError) -> Result<()> {
        if !err.is_item_level() {
            return Err(err);
        }
        match self.options.error_policy {
            ErrorPolicy::Skip => {
                warn!("Skipping {:?}: {}", path, err);
                self.summary.skipped.push(SkippedItem {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                Ok(())
            }
            ErrorPolicy::Abort => Err(PaxcatError::Aborted {
                path: path.to_path_buf(),
                source: Box::new(err),
            }),
        }
    }

    /// Catalog header line content for a directory block
    fn block_header(&self, relative_path: &str) -> String {
        if relative_path.is_empty() {
            self.root.to_string_lossy().into_owned()
        } else {
            self.root.join(relative_path).to_string_lossy().into_owned()
        }
    }
}
