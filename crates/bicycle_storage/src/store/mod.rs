//! Ordered multi-version key-value store.
//!
//! The store is the single linearization point for writes: one writer at a
//! time holds the write lock, logs its batch, publishes the new versions,
//! and only then advances the committed sequence. Readers pin a committed
//! sequence and never observe a batch until it is fully applied.
//!
//! ```rust
//! use bicycle_storage::{Direction, KeyRange, KvStore, WriteBatch};
//!
//! let store = KvStore::in_memory();
//! let mut batch = WriteBatch::new();
//! batch.put(b"a".to_vec(), b"1".to_vec());
//! batch.put(b"b".to_vec(), b"2".to_vec());
//! store.write_batch(batch).unwrap();
//!
//! let keys: Vec<_> = store
//!     .scan(KeyRange::all(), Direction::Reverse, None)
//!     .unwrap()
//!     .map(|entry| entry.unwrap().0)
//!     .collect();
//! assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec()]);
//! ```

mod snapshot;
mod txn;

pub use snapshot::{ScanIter, Snapshot};
pub use txn::WriteTransaction;

use crate::backend::StorageBackend;
use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::mvcc::VersionedMap;
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::WalManager;
use parking_lot::{Mutex, RwLock};
use snapshot::SnapshotPin;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Boxed iterator returned by [`ReadView::scan`].
pub type EntryIter<'a> = Box<dyn Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

impl Direction {
    /// Returns true for [`Direction::Reverse`].
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::Reverse)
    }
}

/// Key bounds of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound.
    pub lower: Bound<Vec<u8>>,
    /// Upper bound.
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    /// Creates a range from explicit bounds.
    #[must_use]
    pub fn new(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        Self { lower, upper }
    }

    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// `[lower, upper)`, or `[lower, ..)` when `upper` is `None`.
    #[must_use]
    pub fn half_open(lower: Vec<u8>, upper: Option<Vec<u8>>) -> Self {
        Self::new(
            Bound::Included(lower),
            upper.map_or(Bound::Unbounded, Bound::Excluded),
        )
    }

    /// Every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        Self::half_open(prefix.to_vec(), prefix_upper_bound(prefix))
    }

    /// Returns true if `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.lower {
            Bound::Included(lo) => key >= lo.as_slice(),
            Bound::Excluded(lo) => key > lo.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(hi) => key <= hi.as_slice(),
            Bound::Excluded(hi) => key < hi.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }

    pub(crate) fn as_refs(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_ref_bound(&self.lower), as_ref_bound(&self.upper))
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when no such key exists (empty or all-`0xFF` prefix).
#[must_use]
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < 0xFF {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Read access at a fixed point: a [`Snapshot`] or a [`WriteTransaction`].
pub trait ReadView {
    /// Reads one key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Scans `range` lazily in `direction`, yielding at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown. The iterator itself
    /// yields `Closed` if the store shuts down mid-scan.
    fn scan(
        &self,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> StorageResult<EntryIter<'_>>;
}

/// Store tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Fsync the log on every commit. Otherwise commits are only flushed.
    pub sync_on_commit: bool,
    /// Entries fetched per read-lock acquisition during a scan.
    pub scan_chunk: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            scan_chunk: 256,
        }
    }
}

impl StoreOptions {
    /// Sets `sync_on_commit`.
    #[must_use]
    pub const fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets the scan chunk size (minimum 1).
    #[must_use]
    pub const fn scan_chunk(mut self, entries: usize) -> Self {
        self.scan_chunk = if entries == 0 { 1 } else { entries };
        self
    }
}

/// Point-in-time store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys with a live newest version.
    pub live_keys: usize,
    /// Stored versions, tombstones included.
    pub versions: usize,
    /// Last committed sequence.
    pub committed_seq: SequenceNumber,
    /// Snapshots currently pinned.
    pub active_snapshots: usize,
    /// Log size in bytes, `None` for a volatile store.
    pub log_bytes: Option<u64>,
}

/// Ordered multi-version key-value store.
pub struct KvStore {
    data: RwLock<VersionedMap>,
    wal: Option<WalManager>,
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
    committed_seq: AtomicU64,
    /// Pinned sequence -> number of holders.
    snapshots: Mutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
    options: StoreOptions,
}

impl KvStore {
    /// Creates a volatile store. Commits are atomic while the process lives
    /// and lost on exit.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::volatile(StoreOptions::default())
    }

    /// [`KvStore::in_memory`] with explicit options. `sync_on_commit` has
    /// no effect without a log.
    #[must_use]
    pub fn volatile(options: StoreOptions) -> Self {
        Self::build(None, options, 1, 0, VersionedMap::new())
    }

    /// Opens a store logged to `backend`, replaying committed batches.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the log fails validation, or
    /// an I/O failure.
    pub fn open(backend: Box<dyn StorageBackend>, options: StoreOptions) -> StorageResult<Self> {
        let wal = WalManager::new(backend, options.sync_on_commit);
        let recovery = wal.recover()?;

        let mut data = VersionedMap::new();
        for batch in &recovery.batches {
            let seq = batch.sequence.as_u64();
            for op in &batch.ops {
                match op {
                    BatchOp::Put { key, value } => data.apply(key.clone(), seq, Some(value.clone())),
                    BatchOp::Delete { key } => data.apply(key.clone(), seq, None),
                }
            }
        }
        data.prune_all(recovery.max_sequence);

        tracing::info!(
            batches = recovery.batches.len(),
            discarded = recovery.discarded,
            truncated_bytes = recovery.truncated_bytes,
            committed_seq = recovery.max_sequence,
            live_keys = data.live_count(),
            "store recovered"
        );

        Ok(Self::build(
            Some(wal),
            options,
            recovery.max_txid + 1,
            recovery.max_sequence,
            data,
        ))
    }

    fn build(
        wal: Option<WalManager>,
        options: StoreOptions,
        next_txid: u64,
        committed_seq: u64,
        data: VersionedMap,
    ) -> Self {
        Self {
            data: RwLock::new(data),
            wal,
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(next_txid),
            committed_seq: AtomicU64::new(committed_seq),
            snapshots: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            options,
        }
    }

    /// Returns true if the store logs its commits.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// Returns true after [`KvStore::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the last committed sequence.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::Acquire))
    }

    pub(crate) fn check_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    /// Pins the current committed state for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown.
    pub fn snapshot(&self) -> StorageResult<Snapshot<'_>> {
        Ok(Snapshot::new(self.pin()?))
    }

    /// Reads one key at the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let pin = self.pin()?;
        Ok(self.read_at(key, pin.seq()))
    }

    /// Scans the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown.
    pub fn scan(
        &self,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> StorageResult<ScanIter<'_>> {
        Ok(ScanIter::new(self.pin()?, range, direction, limit))
    }

    /// Applies `batch` atomically and returns its commit sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IoFailure`] if the batch cannot be logged (the
    /// store is unchanged), or [`StorageError::Closed`].
    pub fn write_batch(&self, batch: WriteBatch) -> StorageResult<SequenceNumber> {
        let mut txn = self.begin_write()?;
        txn.apply(batch);
        txn.commit()
    }

    /// Starts the single write transaction, blocking while another is open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after shutdown.
    pub fn begin_write(&self) -> StorageResult<WriteTransaction<'_>> {
        self.check_open()?;
        let guard = self.write_lock.lock();
        self.check_open()?;
        Ok(WriteTransaction::new(guard, self.pin()?))
    }

    /// Rewrites the log as one compacted batch holding the live key space
    /// and returns the new log size. A volatile store only prunes versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the compacted log cannot be installed. The old log
    /// stays valid in that case.
    pub fn checkpoint(&self) -> StorageResult<u64> {
        self.check_open()?;
        let _guard = self.write_lock.lock();
        self.check_open()?;

        let sequence = self.committed_seq();
        let bytes = match &self.wal {
            Some(wal) => {
                let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
                let live: Vec<(Vec<u8>, Vec<u8>)> = self
                    .data
                    .read()
                    .latest_entries()
                    .map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .collect();
                wal.rewrite(txid, sequence, live)?
            }
            None => 0,
        };

        let horizon = self.horizon();
        self.data.write().prune_all(horizon);
        tracing::info!(%sequence, log_bytes = bytes, "checkpoint complete");
        Ok(bytes)
    }

    /// Shuts the store down. Every later call fails with
    /// [`StorageError::Closed`]; closing twice is a no-op.
    ///
    /// Waits for an open write transaction to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error if the final log sync fails.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        if let Some(wal) = &self.wal {
            wal.sync()?;
        }
        tracing::info!(committed_seq = %self.committed_seq(), "store closed");
        Ok(())
    }

    /// Returns current counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> StorageResult<StoreStats> {
        let (live_keys, versions) = {
            let data = self.data.read();
            (data.live_count(), data.version_count())
        };
        let log_bytes = match &self.wal {
            Some(wal) => Some(wal.size()?),
            None => None,
        };
        Ok(StoreStats {
            live_keys,
            versions,
            committed_seq: self.committed_seq(),
            active_snapshots: self.snapshots.lock().values().sum(),
            log_bytes,
        })
    }

    pub(crate) fn pin(&self) -> StorageResult<SnapshotPin<'_>> {
        self.check_open()?;
        let mut snapshots = self.snapshots.lock();
        // Read under the registry lock so a concurrent commit computes its
        // prune horizon with this pin already visible.
        let seq = self.committed_seq.load(Ordering::Acquire);
        *snapshots.entry(seq).or_insert(0) += 1;
        Ok(SnapshotPin::new(self, seq))
    }

    pub(crate) fn repin(&self, seq: u64) {
        *self.snapshots.lock().entry(seq).or_insert(0) += 1;
    }

    pub(crate) fn unpin(&self, seq: u64) {
        let mut snapshots = self.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&seq);
            }
        }
    }

    /// Oldest sequence any reader may still ask for.
    fn horizon(&self) -> u64 {
        let snapshots = self.snapshots.lock();
        let committed = self.committed_seq.load(Ordering::Acquire);
        snapshots
            .keys()
            .next()
            .map_or(committed, |oldest| (*oldest).min(committed))
    }

    pub(crate) fn read_at(&self, key: &[u8], seq: u64) -> Option<Vec<u8>> {
        self.data.read().get(key, seq).map(<[u8]>::to_vec)
    }

    pub(crate) fn read_chunk(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        seq: u64,
        reverse: bool,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .range_chunk(lower, upper, seq, reverse, limit)
    }

    pub(crate) fn scan_chunk_size(&self) -> usize {
        self.options.scan_chunk
    }

    /// Logs and publishes `pending`. The caller holds the write lock; `base`
    /// is the writer's own pin and is released before pruning so it does not
    /// hold back the horizon.
    pub(crate) fn commit_locked(
        &self,
        pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
        base: SnapshotPin<'_>,
    ) -> StorageResult<SequenceNumber> {
        self.check_open()?;
        if pending.is_empty() {
            return Ok(self.committed_seq());
        }

        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let sequence = self.committed_seq().next();
        let ops: Vec<BatchOp> = pending
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOp::Put { key, value },
                None => BatchOp::Delete { key },
            })
            .collect();

        if let Some(wal) = &self.wal {
            wal.append_batch(txid, sequence, &ops)?;
        }

        let keys: Vec<Vec<u8>> = ops.iter().map(|op| op.key().to_vec()).collect();
        {
            let mut data = self.data.write();
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => data.apply(key, sequence.as_u64(), Some(value)),
                    BatchOp::Delete { key } => data.apply(key, sequence.as_u64(), None),
                }
            }
        }
        self.committed_seq.store(sequence.as_u64(), Ordering::Release);

        drop(base);
        let horizon = self.horizon();
        self.data
            .write()
            .prune_keys(keys.iter().map(Vec::as_slice), horizon);

        tracing::trace!(%txid, %sequence, keys = keys.len(), "batch committed");
        Ok(sequence)
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("durable", &self.is_durable())
            .field("committed_seq", &self.committed_seq())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl KvStore {
    pub(crate) fn with_scan_chunk(mut self, entries: usize) -> Self {
        self.options = self.options.scan_chunk(entries);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn batch(ops: &[(&[u8], Option<&[u8]>)]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, value) in ops {
            match value {
                Some(value) => batch.put(key.to_vec(), value.to_vec()),
                None => batch.delete(key.to_vec()),
            };
        }
        batch
    }

    fn keys(iter: ScanIter<'_>) -> Vec<Vec<u8>> {
        iter.map(|entry| entry.unwrap().0).collect()
    }

    #[test]
    fn write_batch_then_get() {
        let store = KvStore::in_memory();
        let seq = store
            .write_batch(batch(&[(b"a", Some(b"1")), (b"b", Some(b"2"))]))
            .unwrap();
        assert_eq!(seq, SequenceNumber::new(1));
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"c").unwrap(), None);
    }

    #[test]
    fn later_op_on_same_key_wins() {
        let store = KvStore::in_memory();
        store
            .write_batch(batch(&[(b"k", Some(b"1")), (b"k", None), (b"k", Some(b"3"))]))
            .unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn empty_batch_does_not_advance_sequence() {
        let store = KvStore::in_memory();
        assert_eq!(store.write_batch(WriteBatch::new()).unwrap(), SequenceNumber::new(0));
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let store = KvStore::in_memory();
        store.write_batch(batch(&[(b"k", Some(b"old"))])).unwrap();

        let snapshot = store.snapshot().unwrap();
        store.write_batch(batch(&[(b"k", Some(b"new")), (b"j", Some(b"x"))])).unwrap();

        assert_eq!(snapshot.get(b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(snapshot.get(b"j").unwrap(), None);
        assert_eq!(store.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn versions_are_pruned_once_snapshots_drop() {
        let store = KvStore::in_memory();
        store.write_batch(batch(&[(b"k", Some(b"1"))])).unwrap();
        let snapshot = store.snapshot().unwrap();
        store.write_batch(batch(&[(b"k", Some(b"2"))])).unwrap();
        assert_eq!(store.stats().unwrap().versions, 2);

        drop(snapshot);
        store.write_batch(batch(&[(b"k", Some(b"3"))])).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.versions, 1);
        assert_eq!(stats.active_snapshots, 0);
    }

    #[test]
    fn deleted_keys_leave_no_versions_behind() {
        let store = KvStore::in_memory();
        for i in 0u8..100 {
            store.write_batch(batch(&[(&[i], Some(b"v"))])).unwrap();
        }
        for i in 0u8..100 {
            store.write_batch(batch(&[(&[i], None)])).unwrap();
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_keys, 0);
        assert_eq!(stats.versions, 0);
        assert_eq!(stats.active_snapshots, 0);
    }

    #[test]
    fn overwrites_keep_one_version_per_key() {
        let store = KvStore::in_memory();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"k".to_vec(), b"1".to_vec());
        txn.commit().unwrap();
        for i in 0u8..10 {
            store.write_batch(batch(&[(b"k", Some(&[i]))])).unwrap();
        }
        assert_eq!(store.stats().unwrap().versions, 1);
    }

    #[test]
    fn scan_respects_bounds_direction_and_limit() {
        let store = KvStore::in_memory().with_scan_chunk(2);
        let ops: Vec<(Vec<u8>, Vec<u8>)> =
            (0u8..10).map(|i| (vec![b'k', i], vec![i])).collect();
        let mut b = WriteBatch::new();
        for (k, v) in ops {
            b.put(k, v);
        }
        store.write_batch(b).unwrap();

        let range = KeyRange::half_open(vec![b'k', 2], Some(vec![b'k', 7]));
        let forward = keys(store.scan(range.clone(), Direction::Forward, None).unwrap());
        assert_eq!(forward.len(), 5);
        assert_eq!(forward[0], vec![b'k', 2]);

        let reverse = keys(store.scan(range, Direction::Reverse, Some(3)).unwrap());
        assert_eq!(reverse, vec![vec![b'k', 6], vec![b'k', 5], vec![b'k', 4]]);
    }

    #[test]
    fn prefix_range() {
        let store = KvStore::in_memory();
        store
            .write_batch(batch(&[(b"ab", Some(b"")), (b"abc", Some(b"")), (b"b", Some(b""))]))
            .unwrap();
        let found = keys(store.scan(KeyRange::prefix(b"ab"), Direction::Forward, None).unwrap());
        assert_eq!(found, vec![b"ab".to_vec(), b"abc".to_vec()]);
    }

    #[test]
    fn prefix_upper_bound_carries() {
        assert_eq!(prefix_upper_bound(b"a"), Some(b"b".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_upper_bound(&[]), None);
    }

    #[test]
    fn closed_store_rejects_everything() {
        let store = KvStore::in_memory();
        store.write_batch(batch(&[(b"k", Some(b"v"))])).unwrap();
        let mut scan = store.scan(KeyRange::all(), Direction::Forward, None).unwrap();

        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(store.get(b"k"), Err(StorageError::Closed)));
        assert!(matches!(store.begin_write(), Err(StorageError::Closed)));
        assert!(matches!(store.checkpoint(), Err(StorageError::Closed)));
        assert!(matches!(scan.next(), Some(Err(StorageError::Closed))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn durable_store_recovers_committed_batches() {
        let medium = InMemoryBackend::new();
        {
            let store = KvStore::open(Box::new(medium.clone()), StoreOptions::default()).unwrap();
            store.write_batch(batch(&[(b"a", Some(b"1")), (b"b", Some(b"2"))])).unwrap();
            store.write_batch(batch(&[(b"a", None)])).unwrap();
        }

        let store = KvStore::open(Box::new(medium), StoreOptions::default()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.committed_seq(), SequenceNumber::new(2));
    }

    #[test]
    fn checkpoint_compacts_and_survives_reopen() {
        let medium = InMemoryBackend::new();
        let store = KvStore::open(Box::new(medium.clone()), StoreOptions::default()).unwrap();
        for i in 0u8..20 {
            store.write_batch(batch(&[(b"hot", Some(&[i]))])).unwrap();
        }
        let before = store.stats().unwrap().log_bytes.unwrap();
        let after = store.checkpoint().unwrap();
        assert!(after < before);

        store.write_batch(batch(&[(b"cold", Some(b"c"))])).unwrap();
        drop(store);

        let reopened = KvStore::open(Box::new(medium), StoreOptions::default()).unwrap();
        assert_eq!(reopened.get(b"hot").unwrap(), Some(vec![19]));
        assert_eq!(reopened.get(b"cold").unwrap(), Some(b"c".to_vec()));
        assert_eq!(reopened.committed_seq(), SequenceNumber::new(21));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        fn op_strategy() -> impl Strategy<Value = (Vec<u8>, Option<Vec<u8>>)> {
            (
                prop::collection::vec(0u8..4, 1..3),
                prop::option::of(prop::collection::vec(any::<u8>(), 0..4)),
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn store_matches_a_btree_across_reopen(
                batches in prop::collection::vec(prop::collection::vec(op_strategy(), 0..6), 1..12)
            ) {
                let medium = InMemoryBackend::new();
                let mut model = BTreeMap::new();
                {
                    let store = KvStore::open(Box::new(medium.clone()), StoreOptions::default())
                        .unwrap()
                        .with_scan_chunk(3);
                    for ops in &batches {
                        let mut b = WriteBatch::new();
                        for (key, value) in ops {
                            match value {
                                Some(value) => {
                                    b.put(key.clone(), value.clone());
                                    model.insert(key.clone(), value.clone());
                                }
                                None => {
                                    b.delete(key.clone());
                                    model.remove(key);
                                }
                            }
                        }
                        store.write_batch(b).unwrap();
                    }
                    let scanned: Vec<_> = store
                        .scan(KeyRange::all(), Direction::Forward, None)
                        .unwrap()
                        .map(Result::unwrap)
                        .collect();
                    let expected: Vec<_> = model.clone().into_iter().collect();
                    prop_assert_eq!(scanned, expected);
                }

                let reopened = KvStore::open(Box::new(medium), StoreOptions::default()).unwrap();
                let reversed: Vec<_> = reopened
                    .scan(KeyRange::all(), Direction::Reverse, None)
                    .unwrap()
                    .map(Result::unwrap)
                    .collect();
                let expected: Vec<_> = model.into_iter().rev().collect();
                prop_assert_eq!(reversed, expected);
            }
        }
    }
}
