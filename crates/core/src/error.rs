use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Structural failures that abort a discovery run before any result exists.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("cannot traverse {}: {reason}", path.display())]
    Discovery { path: PathBuf, reason: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("file discovery canceled by caller")]
    Cancelled,
}

impl LocateError {
    pub(crate) fn discovery(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Discovery {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}

/// Per-file shred failures. None of these abort a batch.
#[derive(Debug, Error)]
pub enum ShredError {
    #[error("invalid shred configuration: {0}")]
    InvalidConfig(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotRegularFile(PathBuf),

    #[error("failed to {action} {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("verification failed for {} on pass {pass}: {mismatch}", path.display())]
    Verification {
        path: PathBuf,
        pass: u32,
        mismatch: Mismatch,
    },
}

/// What a verification read found instead of the expected pass pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("byte at offset {offset} is {found:#04x}, expected {expected:#04x}")]
    Pattern { offset: u64, expected: u8, found: u8 },

    #[error("chunk at offset {offset} is uniformly {found:#04x}; random data was not written")]
    NotRandom { offset: u64, found: u8 },
}

/// Failure of a single overwrite or verification pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Mismatch(#[from] Mismatch),
}

/// Failure of a text extraction backend. Always recovered as a non-match.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{backend} could not extract text from {}: {message}", path.display())]
    Backend {
        backend: String,
        path: PathBuf,
        message: String,
    },
}
