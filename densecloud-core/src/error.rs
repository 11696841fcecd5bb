//! Error types for densecloud

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for densecloud operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An input file is missing, unreadable or corrupt.
    #[error("cannot read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// An output file could not be written.
    #[error("cannot write '{}': {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// Structurally invalid input: empty mesh, empty cloud, bad configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Build a [`Error::Read`] for `path`.
    pub fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`Error::Write`] for `path`.
    pub fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from the file system rather than the data itself.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Read { .. } | Error::Write { .. })
    }
}

/// Result type alias for densecloud operations
pub type Result<T> = std::result::Result<T, Error>;
