//! Log medium trait.

use crate::error::StorageResult;

/// An append-only byte medium that backs the write-ahead log.
///
/// A medium knows nothing about frames, transactions, or keys. The log writer
/// owns the framing; the medium only stores bytes in order.
///
/// # Invariants
///
/// - `append` writes at the current end and returns that offset
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `sync` makes everything appended so far survive process termination
/// - `replace` swaps the whole content in one step: after a crash the medium
///   holds either the old or the new content, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current size, or an I/O failure.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the medium back to `new_size` bytes.
    ///
    /// Used to roll back a partially appended batch.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole content with `data`.
    ///
    /// Used by checkpointing to install a compacted log.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content cannot be made durable.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
