//! Error types.

use std::io;
use thiserror::Error;

/// Storage adapter error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite driver error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A row came back with an unexpected shape or column type.
    #[error("row decode: {0}")]
    Decode(String),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path absent. Distinct from every other failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// Directory operation on a file handle.
    #[error("cannot list '{0}': path is a file")]
    NotADirectory(String),

    /// Byte read on a directory handle.
    #[error("cannot read '{0}': path is a directory")]
    IsADirectory(String),

    /// Delete phase of a buffer flush failed.
    #[error("delete failed: {0}")]
    DeleteFailed(#[source] StoreError),

    /// Directory-row insert phase of a buffer flush failed.
    #[error("dir insert failed: {0}")]
    DirInsertFailed(#[source] StoreError),

    /// File-row insert phase of a buffer flush failed.
    #[error("file insert failed: {0}")]
    FileInsertFailed(#[source] StoreError),

    /// Backend failure outside the flush phases, propagated unmodified.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// True if this is the NotFound sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convert FsError to std::io::Error so handles can implement `io::Read`.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::NotADirectory(_) => {
                io::Error::new(io::ErrorKind::NotADirectory, e.to_string())
            }
            FsError::IsADirectory(_) => io::Error::new(io::ErrorKind::IsADirectory, e.to_string()),
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
