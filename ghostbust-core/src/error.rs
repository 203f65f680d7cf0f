//! Typed error handling for ghostbust.
//!
//! Every variant names the file, script or cache hash it concerns so that
//! callers can report actionable failures instead of bare generic errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::trace::Trace;

/// Main error type for ghostbust operations.
#[derive(Error, Debug)]
pub enum GhostbustError {
    /// I/O error when reading/writing files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Syntax error in a Python source file
    #[error("Parse error in {}{}: {message}", path.display(), location_suffix(*line, *column))]
    Parse {
        path: PathBuf,
        message: String,
        /// Line number (1-indexed) if available
        line: Option<usize>,
        /// Column number (1-indexed) if available
        column: Option<usize>,
    },

    /// The profiled script faulted. The partial trace is still available.
    #[error("Execution fault in {}: {message}", script.display())]
    ExecutionFault {
        script: PathBuf,
        message: String,
        trace: Box<Trace>,
    },

    /// The interpreter could not be started at all (no trace exists)
    #[error("Failed to launch {interpreter} for {}: {message}", script.display())]
    Launch {
        interpreter: String,
        script: PathBuf,
        message: String,
    },

    /// No cache entry for the requested hash
    #[error("No cached trace for hash {hash}")]
    NotFound { hash: String },

    /// A stored entry exists but cannot be read back
    #[error("Corrupt cache entry {hash} at {}: {message}", path.display())]
    CacheCorruption {
        hash: String,
        path: PathBuf,
        message: String,
    },

    /// Another writer holds the lock for this hash
    #[error("Cache entry {hash} is locked by another writer")]
    CacheLocked { hash: String },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

fn location_suffix(line: Option<usize>, column: Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(":{}:{}", l, c),
        (Some(l), None) => format!(":{}", l),
        _ => String::new(),
    }
}

impl GhostbustError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a parse error without location.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Create a parse error with line/column info.
    pub fn parse_at(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Create a cache miss error.
    pub fn not_found(hash: impl Into<String>) -> Self {
        Self::NotFound { hash: hash.into() }
    }

    /// Create a cache corruption error.
    pub fn corruption(
        hash: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::CacheCorruption {
            hash: hash.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if the caller can act on this error and continue
    /// (run the tracer, inspect the partial trace, retry the writer).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::ExecutionFault { .. } | Self::CacheLocked { .. }
        )
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Parse { path, .. } => Some(path),
            Self::ExecutionFault { script, .. } => Some(script),
            Self::Launch { script, .. } => Some(script),
            Self::CacheCorruption { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Get the cache hash associated with this error, if any.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::NotFound { hash }
            | Self::CacheCorruption { hash, .. }
            | Self::CacheLocked { hash } => Some(hash),
            Self::ExecutionFault { trace, .. } => Some(trace.content_hash.as_str()),
            _ => None,
        }
    }

    /// Take the partial trace out of an execution fault.
    pub fn into_partial_trace(self) -> Option<Trace> {
        match self {
            Self::ExecutionFault { trace, .. } => Some(*trace),
            _ => None,
        }
    }
}

/// Convenience type alias for ghostbust results.
pub type GhostbustResult<T> = Result<T, GhostbustError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> GhostbustResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> GhostbustResult<T> {
        self.map_err(|e| GhostbustError::io(path, e))
    }
}
