//! Error types for spool-core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the spool library
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying stream failed to read, write or flush
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Compressed or framed data does not have the expected structure
    #[error("Format error: {0}")]
    Format(String),

    /// A payload did not match the size declared in its header
    #[error("Size mismatch for {name}: declared {declared} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    /// A filesystem operation failed while packing or extracting
    #[error("Filesystem error while {action} {path:?}: {source}")]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Entry name is unsafe or cannot be encoded
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors caused by malformed archive data
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
        Error::filesystem("walking", path, err.into())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(io_err) => io_err,
            Error::Format(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::SizeMismatch { .. } | Error::InvalidPath(_) | Error::Config(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
