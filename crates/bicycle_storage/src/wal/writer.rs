//! Log writer and recovery.

use crate::backend::StorageBackend;
use crate::batch::BatchOp;
use crate::error::StorageResult;
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::iterator::WalRecordIterator;
use crate::wal::record::WalRecord;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A batch recovered from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// Transaction that wrote the batch.
    pub txid: TransactionId,
    /// Sequence the batch was committed at.
    pub sequence: SequenceNumber,
    /// Operations in log order.
    pub ops: Vec<BatchOp>,
}

/// Result of replaying a log.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Committed batches in commit order.
    pub batches: Vec<CommittedBatch>,
    /// Highest transaction ID seen, committed or not.
    pub max_txid: u64,
    /// Highest committed sequence.
    pub max_sequence: u64,
    /// Transactions that had frames but no commit.
    pub discarded: usize,
    /// Bytes cut from a torn tail.
    pub truncated_bytes: u64,
}

/// Append-side owner of a log medium.
///
/// Every committed batch is written as one contiguous append
/// (`Begin`, its `Put`/`Delete` frames, `Commit`). If the append or the
/// following flush fails, the medium is cut back to its previous length so
/// a failed commit leaves no frames behind.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Wraps a medium. With `sync_on_commit` every batch is fsynced,
    /// otherwise it is only flushed to the OS.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends one committed batch.
    ///
    /// # Errors
    ///
    /// Returns the medium's error. The log is restored to its prior length
    /// before returning.
    pub fn append_batch(
        &self,
        txid: TransactionId,
        sequence: SequenceNumber,
        ops: &[BatchOp],
    ) -> StorageResult<u64> {
        let mut data = WalRecord::Begin { txid }.encode_frame()?;
        for op in ops {
            let record = match op {
                BatchOp::Put { key, value } => WalRecord::Put {
                    txid,
                    key: key.clone(),
                    value: value.clone(),
                },
                BatchOp::Delete { key } => WalRecord::Delete {
                    txid,
                    key: key.clone(),
                },
            };
            data.extend_from_slice(&record.encode_frame()?);
        }
        data.extend_from_slice(&WalRecord::Commit { txid, sequence }.encode_frame()?);

        let mut backend = self.backend.lock();
        let start = backend.size()?;
        let written = backend.append(&data).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        if let Err(e) = written {
            if let Err(rollback) = backend.truncate(start) {
                tracing::error!(%txid, error = %rollback, "failed to roll back partial log append");
            }
            return Err(e);
        }
        Ok(start)
    }

    /// Replays the log and returns every committed batch.
    ///
    /// The log is cut back to the end of the last committed batch, dropping
    /// a torn tail together with the frames of the batch it belonged to.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Corrupted`] on checksum or framing
    /// errors, or an I/O failure.
    pub fn recover(&self) -> StorageResult<Recovery> {
        let mut backend = self.backend.lock();
        let mut recovery = Recovery::default();
        let mut pending: HashMap<TransactionId, Vec<BatchOp>> = HashMap::new();

        let committed_len = {
            let mut iter = WalRecordIterator::new(&**backend)?;
            let mut committed_len = 0;
            while let Some(item) = iter.next() {
                let (_, record) = item?;
                if let Some(txid) = record.txid() {
                    recovery.max_txid = recovery.max_txid.max(txid.as_u64());
                }
                match record {
                    WalRecord::Begin { txid } => {
                        pending.insert(txid, Vec::new());
                    }
                    WalRecord::Put { txid, key, value } => {
                        pending
                            .entry(txid)
                            .or_default()
                            .push(BatchOp::Put { key, value });
                    }
                    WalRecord::Delete { txid, key } => {
                        pending.entry(txid).or_default().push(BatchOp::Delete { key });
                    }
                    WalRecord::Commit { txid, sequence } => {
                        let ops = pending.remove(&txid).unwrap_or_default();
                        recovery.max_sequence = recovery.max_sequence.max(sequence.as_u64());
                        recovery.batches.push(CommittedBatch {
                            txid,
                            sequence,
                            ops,
                        });
                        committed_len = iter.valid_len();
                    }
                    WalRecord::Checkpoint { sequence } => {
                        recovery.max_sequence = recovery.max_sequence.max(sequence.as_u64());
                        committed_len = iter.valid_len();
                    }
                }
            }
            committed_len
        };

        recovery.discarded = pending.len();
        let size = backend.size()?;
        if committed_len < size {
            recovery.truncated_bytes = size - committed_len;
            backend.truncate(committed_len)?;
        }
        Ok(recovery)
    }

    /// Replaces the log with a single compacted transaction holding `live`,
    /// followed by a `Checkpoint` frame at `sequence`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new image cannot be installed. The old log
    /// stays in place in that case.
    pub fn rewrite(
        &self,
        txid: TransactionId,
        sequence: SequenceNumber,
        live: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    ) -> StorageResult<u64> {
        let mut data = WalRecord::Begin { txid }.encode_frame()?;
        for (key, value) in live {
            data.extend_from_slice(&WalRecord::Put { txid, key, value }.encode_frame()?);
        }
        data.extend_from_slice(&WalRecord::Commit { txid, sequence }.encode_frame()?);
        data.extend_from_slice(&WalRecord::Checkpoint { sequence }.encode_frame()?);

        let len = data.len() as u64;
        self.backend.lock().replace(&data)?;
        Ok(len)
    }

    /// Forces the log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.backend.lock().sync()
    }

    /// Returns the log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.lock().size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn put(key: &[u8], value: &[u8]) -> BatchOp {
        BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn committed_batches_are_recovered() {
        let medium = InMemoryBackend::new();
        let wal = WalManager::new(Box::new(medium.clone()), false);
        wal.append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put(b"a", b"1")])
            .unwrap();
        wal.append_batch(
            TransactionId::new(2),
            SequenceNumber::new(2),
            &[BatchOp::Delete { key: b"a".to_vec() }],
        )
        .unwrap();

        let reopened = WalManager::new(Box::new(medium), false);
        let recovery = reopened.recover().unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.max_txid, 2);
        assert_eq!(recovery.max_sequence, 2);
        assert_eq!(recovery.batches[0].ops, vec![put(b"a", b"1")]);
    }

    #[test]
    fn uncommitted_frames_are_discarded() {
        let txid = TransactionId::new(9);
        let mut data = WalRecord::Begin { txid }.encode_frame().unwrap();
        data.extend(
            WalRecord::Put {
                txid,
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            }
            .encode_frame()
            .unwrap(),
        );

        let medium = InMemoryBackend::with_data(data);
        let wal = WalManager::new(Box::new(medium.clone()), false);
        let recovery = wal.recover().unwrap();
        assert!(recovery.batches.is_empty());
        assert_eq!(recovery.discarded, 1);
        assert_eq!(recovery.max_txid, 9);
        assert!(medium.data().is_empty());
    }

    #[test]
    fn torn_batch_is_cut_back_to_its_begin_frame() {
        let medium = InMemoryBackend::new();
        let wal = WalManager::new(Box::new(medium.clone()), false);
        wal.append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put(b"a", b"1")])
            .unwrap();
        let good = medium.data();
        wal.append_batch(
            TransactionId::new(2),
            SequenceNumber::new(2),
            &[put(b"b", b"2"), put(b"c", b"3"), put(b"d", b"4")],
        )
        .unwrap();

        // Keep the second batch's Begin and first Put, tear the second Put.
        let begin = WalRecord::Begin {
            txid: TransactionId::new(2),
        }
        .encode_frame()
        .unwrap();
        let first_put = WalRecord::Put {
            txid: TransactionId::new(2),
            key: b"b".to_vec(),
            value: b"2".to_vec(),
        }
        .encode_frame()
        .unwrap();
        let mut torn = medium.data();
        torn.truncate(good.len() + begin.len() + first_put.len() + 3);

        let torn_medium = InMemoryBackend::with_data(torn);
        let reopened = WalManager::new(Box::new(torn_medium.clone()), false);
        let recovery = reopened.recover().unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(recovery.discarded, 1);
        assert_eq!(torn_medium.data(), good);

        reopened
            .append_batch(TransactionId::new(3), SequenceNumber::new(2), &[put(b"e", b"5")])
            .unwrap();
        let recovery = WalManager::new(Box::new(torn_medium), false).recover().unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.discarded, 0);
        assert_eq!(recovery.batches[1].ops, vec![put(b"e", b"5")]);
    }

    #[test]
    fn torn_tail_is_cut_off() {
        let medium = InMemoryBackend::new();
        let wal = WalManager::new(Box::new(medium.clone()), false);
        wal.append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put(b"a", b"1")])
            .unwrap();
        let good_len = medium.data().len();
        wal.append_batch(TransactionId::new(2), SequenceNumber::new(2), &[put(b"b", b"2")])
            .unwrap();

        let mut torn = medium.data();
        torn.truncate(torn.len() - 2);
        let torn_medium = InMemoryBackend::with_data(torn);
        let recovered = WalManager::new(Box::new(torn_medium.clone()), false)
            .recover()
            .unwrap();

        assert_eq!(recovered.batches.len(), 1);
        assert!(recovered.truncated_bytes > 0);
        assert_eq!(torn_medium.data().len(), good_len);
    }

    #[test]
    fn rewrite_leaves_one_compacted_batch() {
        let medium = InMemoryBackend::new();
        let wal = WalManager::new(Box::new(medium.clone()), false);
        for i in 0..5u8 {
            wal.append_batch(
                TransactionId::new(u64::from(i) + 1),
                SequenceNumber::new(u64::from(i) + 1),
                &[put(b"same", &[i])],
            )
            .unwrap();
        }
        let before = wal.size().unwrap();

        wal.rewrite(
            TransactionId::new(6),
            SequenceNumber::new(5),
            vec![(b"same".to_vec(), vec![4u8])],
        )
        .unwrap();
        assert!(wal.size().unwrap() < before);

        let recovery = WalManager::new(Box::new(medium), false).recover().unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(recovery.max_sequence, 5);
        assert_eq!(recovery.batches[0].ops, vec![put(b"same", &[4])]);
    }
}
