//! Log frame types and their binary layout.

use crate::error::{StorageError, StorageResult};
use crate::types::{SequenceNumber, TransactionId};

/// Magic bytes opening every frame.
pub const WAL_MAGIC: [u8; 4] = *b"BCYL";

/// Current frame format version.
pub const WAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub(crate) const CRC_SIZE: usize = 4;

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Opens a transaction.
    Begin = 1,
    /// Writes a key.
    Put = 2,
    /// Removes a key.
    Delete = 3,
    /// Makes a transaction visible.
    Commit = 4,
    /// Marks a compacted image.
    Checkpoint = 5,
}

impl WalRecordType {
    /// Converts a byte to a frame type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the frame type to its byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One logical entry of the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Opens a transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Writes `value` under `key`.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Store key.
        key: Vec<u8>,
        /// New value.
        value: Vec<u8>,
    },

    /// Removes `key`.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Store key.
        key: Vec<u8>,
    },

    /// Makes every frame of `txid` visible at `sequence`.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence assigned to the batch.
        sequence: SequenceNumber,
    },

    /// The frames before this one form a compacted image at `sequence`.
    Checkpoint {
        /// Sequence of the image.
        sequence: SequenceNumber,
    },
}

impl WalRecord {
    /// Returns the frame type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the transaction the frame belongs to, if any.
    #[must_use]
    pub fn txid(&self) -> Option<TransactionId> {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. } => Some(*txid),
            Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the frame payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value does not fit a 4-byte length.
    pub fn encode_payload(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Begin { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::Put { txid, key, value } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { txid, key } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_bytes(&mut buf, key)?;
            }
            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
            Self::Checkpoint { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Serializes the complete frame: header, payload, and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn encode_frame(&self) -> StorageResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::invalid_operation("log frame payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&WAL_MAGIC);
        frame.extend_from_slice(&WAL_VERSION.to_le_bytes());
        frame.push(self.record_type().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Deserializes a frame payload of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the payload is short or has
    /// trailing bytes.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> StorageResult<Self> {
        let mut reader = PayloadReader { payload, cursor: 0 };

        let record = match record_type {
            WalRecordType::Begin => Self::Begin {
                txid: TransactionId::new(reader.u64()?),
            },
            WalRecordType::Put => Self::Put {
                txid: TransactionId::new(reader.u64()?),
                key: reader.bytes()?,
                value: reader.bytes()?,
            },
            WalRecordType::Delete => Self::Delete {
                txid: TransactionId::new(reader.u64()?),
                key: reader.bytes()?,
            },
            WalRecordType::Commit => Self::Commit {
                txid: TransactionId::new(reader.u64()?),
                sequence: SequenceNumber::new(reader.u64()?),
            },
            WalRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(reader.u64()?),
            },
        };

        if reader.cursor != payload.len() {
            return Err(StorageError::corrupted(format!(
                "trailing bytes in {record_type:?} frame: used {}, got {}",
                reader.cursor,
                payload.len()
            )));
        }
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StorageResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| StorageError::invalid_operation("key or value exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl PayloadReader<'_> {
    fn take(&mut self, n: usize) -> StorageResult<&[u8]> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| StorageError::corrupted("unexpected end of frame payload"))?;
        let slice = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u64(&mut self) -> StorageResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> StorageResult<Vec<u8>> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        let len = u32::from_le_bytes(raw) as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
