//! Sequential frame reader used by recovery.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::wal::record::{
    compute_crc32, WalRecord, WalRecordType, CRC_SIZE, HEADER_SIZE, WAL_MAGIC, WAL_VERSION,
};

/// Reads frames one at a time from the start of a log medium.
///
/// - A truncated header or payload at the end of the log ends iteration
///   cleanly; [`WalRecordIterator::valid_len`] then reports where the last
///   complete frame ended.
/// - A checksum mismatch, bad magic, unknown frame type, or newer format
///   version yields [`StorageError::Corrupted`] and ends iteration.
pub struct WalRecordIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Creates an iterator over the whole medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> StorageResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: 0,
            finished: false,
        })
    }

    /// Returns the offset just past the last complete frame read so far.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    fn remaining(&self) -> u64 {
        self.total_size - self.offset
    }

    fn read_next(&mut self) -> StorageResult<Option<(u64, WalRecord)>> {
        let start = self.offset;
        if self.remaining() < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != WAL_MAGIC {
            return Err(StorageError::corrupted(format!(
                "invalid magic at offset {start}"
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > WAL_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported frame version {version} at offset {start}"
            )));
        }

        let type_byte = header[6];
        let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
            StorageError::corrupted(format!(
                "unknown frame type {type_byte} at offset {start}"
            ))
        })?;

        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let frame_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if self.remaining() < frame_len as u64 {
            // Crash mid-append: the tail never committed.
            return Ok(None);
        }

        let frame = self.backend.read_at(start, frame_len)?;
        let body_len = frame_len - CRC_SIZE;
        let mut stored = [0u8; CRC_SIZE];
        stored.copy_from_slice(&frame[body_len..]);
        let stored = u32::from_le_bytes(stored);
        let computed = compute_crc32(&frame[..body_len]);
        if stored != computed {
            return Err(StorageError::corrupted(format!(
                "checksum mismatch at offset {start}: expected {stored:#010x}, got {computed:#010x}"
            )));
        }

        let record = WalRecord::decode_payload(record_type, &frame[HEADER_SIZE..body_len])?;
        self.offset = start + frame_len as u64;
        Ok(Some((start, record)))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = StorageResult<(u64, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
