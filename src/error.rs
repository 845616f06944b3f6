//! Error types for the paxcat library
//!
//! This module defines all error types that can occur while archiving a tree.
//! Errors fall into two groups:
//!
//! - **Item-level** errors concern a single filesystem item (an unsupported
//!   file type, a directory that cannot be listed, a file that fails mid-read).
//!   The traversal engine recovers from these locally when the run is
//!   configured with [`ErrorPolicy::Skip`](crate::types::ErrorPolicy::Skip).
//! - **Fatal** errors (preconditions, archive or catalog sink failures,
//!   internal faults) always terminate the run.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the paxcat library
pub type Result<T> = std::result::Result<T, PaxcatError>;

/// Which of the two output streams a sink error concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// The compressed PAX archive
    Archive,
    /// The text catalog
    Catalog,
}

impl std::fmt::Display for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Archive => write!(f, "archive"),
            Sink::Catalog => write!(f, "catalog"),
        }
    }
}

/// Main error type for all paxcat operations
#[derive(Debug, Error)]
pub enum PaxcatError {
    /// I/O errors that carry no more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A run precondition does not hold; nothing has been written yet
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Filesystem status of an item could not be read
    #[error("Cannot stat {path:?}: {source}")]
    Metadata {
        /// Path that could not be inspected
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Item is neither a directory, a regular file nor a symlink
    #[error("Unsupported file type ({kind}): {path:?}")]
    UnsupportedFileType {
        /// Path to the unsupported item
        path: PathBuf,
        /// Human-readable kind, e.g. "fifo" or "socket"
        kind: &'static str,
    },

    /// Name or symlink target is not valid UTF-8
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// A directory could not be listed
    #[error("Cannot enumerate directory {path:?}: {source}")]
    Enumerate {
        /// Directory that failed to list
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The source root could not be listed after the outputs were created
    #[error("Cannot list source root {path:?}: {source}")]
    RootUnlisted {
        /// The source root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
        /// Output files left behind incomplete
        outputs: Vec<PathBuf>,
    },

    /// A regular file could not be opened or failed part way through
    #[error("Read failed for {path:?}: {source}")]
    Read {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Writing to the archive or catalog failed; both outputs are unusable
    #[error("Writing {sink} {path:?} failed: {source}")]
    SinkFailed {
        /// Which output failed
        sink: Sink,
        /// Path of the failing output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Staging area for file content (spooled temp file) failed
    #[error("Staging content of {path:?} failed: {source}")]
    Staging {
        /// File whose content was being staged
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An item-level failure that the run was configured to treat as fatal
    #[error("Aborted on {path:?}: {source}")]
    Aborted {
        /// Item that triggered the abort
        path: PathBuf,
        /// The item-level error
        #[source]
        source: Box<PaxcatError>,
    },

    /// A catalog file that does not follow the block/row layout
    #[error("Malformed catalog at line {line}: {message}")]
    CatalogParse {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaxcatError {
    /// Create a precondition error with a custom message
    pub fn precondition(msg: impl Into<String>) -> Self {
        PaxcatError::Precondition(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        PaxcatError::Internal(msg.into())
    }

    /// Wrap an I/O error raised by one of the output sinks
    pub fn sink(sink: Sink, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PaxcatError::SinkFailed {
            sink,
            path: path.into(),
            source,
        }
    }

    /// Check if this error concerns a single item and may be skipped
    ///
    /// Item-level errors leave both outputs consistent: nothing of the failing
    /// item has been committed to either stream.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            PaxcatError::Metadata { .. }
                | PaxcatError::UnsupportedFileType { .. }
                | PaxcatError::PathConversion(_)
                | PaxcatError::Enumerate { .. }
                | PaxcatError::Read { .. }
        )
    }

    /// Check if this error leaves partially written outputs behind
    pub fn leaves_partial_output(&self) -> bool {
        matches!(
            self,
            PaxcatError::SinkFailed { .. }
                | PaxcatError::RootUnlisted { .. }
                | PaxcatError::Staging { .. }
                | PaxcatError::Aborted { .. }
                | PaxcatError::Internal(_)
                | PaxcatError::ThreadPool(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            PaxcatError::Precondition(msg) => {
                format!("{}. Nothing was written.", msg)
            }
            PaxcatError::SinkFailed { sink, path, source } => {
                format!(
                    "Could not write {} {:?} ({}). Check free space and permissions; \
                     the partially written outputs are not usable.",
                    sink, path, source
                )
            }
            PaxcatError::RootUnlisted {
                path,
                source,
                outputs,
            } => {
                let outputs: Vec<String> = outputs.iter().map(|p| format!("{:?}", p)).collect();
                format!(
                    "Source {:?} could not be listed ({}). The partially written outputs {} \
                     are not usable.",
                    path,
                    source,
                    outputs.join(" and ")
                )
            }
            PaxcatError::Aborted { path, source } => {
                format!(
                    "Stopped at {:?}: {}. Run without abort-on-error to skip such items.",
                    path, source
                )
            }
            _ => self.to_string(),
        }
    }
}
