//! Error type shared by every stage of contact resolution.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NccError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed NCC line; there is no partial-line recovery.
    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Too many contacts in {path} ({count} > {max}), this code is meant for single cell data")]
    TooManyContacts {
        path: PathBuf,
        count: usize,
        max: usize,
    },

    /// Ambiguity group numbering drifted between passes over the same data.
    #[error("Ambiguity group count mismatch: expected {expected}, found {found}")]
    GroupCountMismatch { expected: usize, found: usize },

    /// Rewritten codes would regroup the contacts, e.g. a legacy group whose
    /// lines are not contiguous.
    #[error("Ambiguity grouping would change at line {line}")]
    GroupingChanged { line: usize },

    #[error("Line count mismatch: indexed {expected} lines but rewrote {found}")]
    LineCountMismatch { expected: usize, found: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Resolution cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, NccError>;

impl NccError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
