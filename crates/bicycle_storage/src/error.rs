//! Error types for the storage layer.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the log media, the write-ahead log, and the key-value store.
///
/// Messages describe offsets and sizes only. Key and value bytes never appear
/// in an error so callers can surface them verbatim.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying medium failed.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] io::Error),

    /// Attempted to read beyond the end of a log medium.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current medium size.
        size: u64,
    },

    /// The write-ahead log failed validation during recovery.
    #[error("log corrupted: {0}")]
    Corrupted(String),

    /// The store has been shut down.
    #[error("storage is closed")]
    Closed,

    /// Another process holds the data directory lock.
    #[error("data directory is locked by another process")]
    Locked,

    /// The request is not valid in the current state.
    #[error("invalid storage operation: {0}")]
    InvalidOperation(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Returns true if the store was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
