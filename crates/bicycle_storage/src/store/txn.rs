//! The single write transaction.

use super::snapshot::SnapshotPin;
use super::{Direction, EntryIter, KeyRange, ReadView};
use crate::batch::{BatchOp, WriteBatch};
use crate::error::StorageResult;
use crate::types::SequenceNumber;
use parking_lot::MutexGuard;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound;

/// Exclusive write access to a [`crate::KvStore`].
///
/// Reads see the last committed state overlaid with this transaction's own
/// pending writes. Nothing becomes visible to other readers before
/// [`WriteTransaction::commit`]. Dropping the transaction without committing
/// discards the pending writes and releases the writer lock, on every exit
/// path including unwinding.
///
/// ```rust
/// use bicycle_storage::{KvStore, ReadView};
///
/// let store = KvStore::in_memory();
/// let mut txn = store.begin_write().unwrap();
/// txn.put(b"k".to_vec(), b"v".to_vec());
/// assert_eq!(txn.get(b"k").unwrap(), Some(b"v".to_vec()));
/// assert_eq!(store.get(b"k").unwrap(), None);
/// txn.commit().unwrap();
/// assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
/// ```
pub struct WriteTransaction<'a> {
    _guard: MutexGuard<'a, ()>,
    base: SnapshotPin<'a>,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, ()>, base: SnapshotPin<'a>) -> Self {
        Self {
            _guard: guard,
            base,
            pending: BTreeMap::new(),
        }
    }

    /// Returns the committed sequence the transaction reads from.
    #[must_use]
    pub fn base_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.base.seq())
    }

    /// Stages a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.insert(key, Some(value));
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.pending.insert(key, None);
    }

    /// Stages every operation of `batch` in order.
    pub fn apply(&mut self, batch: WriteBatch) {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => self.put(key, value),
                BatchOp::Delete { key } => self.delete(key),
            }
        }
    }

    /// Number of distinct keys staged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Logs and publishes the staged writes as one batch.
    ///
    /// Returns the commit sequence; an empty transaction returns the current
    /// one without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::IoFailure`] if the batch cannot be
    /// logged, or [`crate::StorageError::Closed`]. The store is unchanged in
    /// both cases.
    pub fn commit(self) -> StorageResult<SequenceNumber> {
        self.commit_with(|_| {})
    }

    /// Like [`WriteTransaction::commit`], but runs `published` after the
    /// batch is visible and before the writer lock is released, so no other
    /// writer can run in between. `published` is skipped if the commit fails.
    ///
    /// # Errors
    ///
    /// Same as [`WriteTransaction::commit`].
    pub fn commit_with<F>(self, published: F) -> StorageResult<SequenceNumber>
    where
        F: FnOnce(SequenceNumber),
    {
        let Self {
            _guard,
            base,
            pending,
        } = self;
        let sequence = base.store().commit_locked(pending, base)?;
        published(sequence);
        Ok(sequence)
    }

    /// Discards the staged writes.
    pub fn abort(self) {
        tracing::trace!(staged = self.pending.len(), "write transaction aborted");
    }
}

impl ReadView for WriteTransaction<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let store = self.base.store();
        store.check_open()?;
        match self.pending.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(store.read_at(key, self.base.seq())),
        }
    }

    fn scan(
        &self,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> StorageResult<EntryIter<'_>> {
        let store = self.base.store();
        store.check_open()?;

        let staged: Vec<(Vec<u8>, Option<Vec<u8>>)> = {
            let (lower, upper) = range.as_refs();
            if crate::mvcc::range_is_empty(lower, upper) {
                Vec::new()
            } else {
                let entries = self
                    .pending
                    .range::<[u8], _>((lower, upper))
                    .map(|(k, v)| (k.clone(), v.clone()));
                if direction.is_reverse() {
                    entries.rev().collect()
                } else {
                    entries.collect()
                }
            }
        };

        let base = super::ScanIter::new(self.base.clone(), range, direction, None);
        Ok(Box::new(OverlayIter {
            base: base.peekable(),
            staged: staged.into_iter().peekable(),
            reverse: direction.is_reverse(),
            remaining: limit,
        }))
    }
}

#[derive(Clone, Copy)]
enum Next {
    Base,
    Staged,
    Both,
}

/// Merges a committed scan with staged writes; staged entries shadow
/// committed ones with the same key.
struct OverlayIter<B, S>
where
    B: Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>>,
    S: Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
{
    base: Peekable<B>,
    staged: Peekable<S>,
    reverse: bool,
    remaining: Option<usize>,
}

impl<B, S> Iterator for OverlayIter<B, S>
where
    B: Iterator<Item = StorageResult<(Vec<u8>, Vec<u8>)>>,
    S: Iterator<Item = (Vec<u8>, Option<Vec<u8>>)>,
{
    type Item = StorageResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }

        loop {
            let next = match (self.base.peek(), self.staged.peek()) {
                (None, None) => return None,
                (Some(Err(_)) | Some(Ok(_)), None) | (Some(Err(_)), Some(_)) => Next::Base,
                (None, Some(_)) => Next::Staged,
                (Some(Ok((base_key, _))), Some((staged_key, _))) => {
                    let mut order = base_key.cmp(staged_key);
                    if self.reverse {
                        order = order.reverse();
                    }
                    match order {
                        Ordering::Less => Next::Base,
                        Ordering::Equal => Next::Both,
                        Ordering::Greater => Next::Staged,
                    }
                }
            };

            let entry = match next {
                Next::Base => match self.base.next()? {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.remaining = Some(0);
                        return Some(Err(e));
                    }
                },
                Next::Staged | Next::Both => {
                    if matches!(next, Next::Both) {
                        self.base.next();
                    }
                    match self.staged.next()? {
                        (key, Some(value)) => (key, value),
                        (_, None) => continue,
                    }
                }
            };

            if let Some(left) = self.remaining.as_mut() {
                *left -= 1;
            }
            return Some(Ok(entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Direction, KeyRange, KvStore, ReadView, StorageError, WriteBatch};

    fn seeded() -> KvStore {
        let store = KvStore::in_memory();
        let mut batch = WriteBatch::new();
        for key in [b"a", b"c", b"e"] {
            batch.put(key.to_vec(), b"committed".to_vec());
        }
        store.write_batch(batch).unwrap();
        store
    }

    fn scan_keys(txn: &dyn ReadView, direction: Direction, limit: Option<usize>) -> Vec<Vec<u8>> {
        txn.scan(KeyRange::all(), direction, limit)
            .unwrap()
            .map(|e| e.unwrap().0)
            .collect()
    }

    #[test]
    fn reads_own_writes() {
        let store = seeded();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"b".to_vec(), b"staged".to_vec());
        txn.delete(b"c".to_vec());

        assert_eq!(txn.get(b"b").unwrap(), Some(b"staged".to_vec()));
        assert_eq!(txn.get(b"c").unwrap(), None);
        assert_eq!(txn.get(b"a").unwrap(), Some(b"committed".to_vec()));
    }

    #[test]
    fn scan_merges_staged_writes() {
        let store = seeded();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"b".to_vec(), b"staged".to_vec());
        txn.put(b"e".to_vec(), b"replaced".to_vec());
        txn.delete(b"c".to_vec());

        let forward = scan_keys(&txn, Direction::Forward, None);
        assert_eq!(forward, vec![b"a".to_vec(), b"b".to_vec(), b"e".to_vec()]);

        let reverse = scan_keys(&txn, Direction::Reverse, Some(2));
        assert_eq!(reverse, vec![b"e".to_vec(), b"b".to_vec()]);

        let replaced = txn.get(b"e").unwrap();
        assert_eq!(replaced, Some(b"replaced".to_vec()));
    }

    #[test]
    fn commit_with_runs_while_the_writer_lock_is_held() {
        let store = seeded();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"new".to_vec(), b"1".to_vec());

        let mut seen = None;
        let sequence = txn
            .commit_with(|sequence| {
                assert!(store.write_lock.try_lock().is_none());
                assert_eq!(store.get(b"new").unwrap(), Some(b"1".to_vec()));
                seen = Some(sequence);
            })
            .unwrap();
        assert_eq!(seen, Some(sequence));
        assert!(store.write_lock.try_lock().is_some());
    }

    #[test]
    fn commit_with_skips_the_callback_on_failure() {
        let store = seeded();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"new".to_vec(), b"1".to_vec());
        store.closed.store(true, std::sync::atomic::Ordering::Release);

        let mut called = false;
        assert!(txn.commit_with(|_| called = true).is_err());
        assert!(!called);
    }

    #[test]
    fn drop_discards_and_releases_lock() {
        let store = seeded();
        {
            let mut txn = store.begin_write().unwrap();
            txn.put(b"z".to_vec(), b"lost".to_vec());
        }
        assert_eq!(store.get(b"z").unwrap(), None);

        let txn = store.begin_write().unwrap();
        txn.abort();
        assert!(store.begin_write().is_ok());
    }

    #[test]
    fn commit_after_close_fails_cleanly() {
        let store = seeded();
        let mut txn = store.begin_write().unwrap();
        txn.put(b"x".to_vec(), b"1".to_vec());

        let closer = std::thread::scope(|scope| {
            let handle = scope.spawn(|| store.close());
            while !store.is_closed() {
                std::thread::yield_now();
            }
            assert!(matches!(txn.commit(), Err(StorageError::Closed)));
            handle.join().unwrap()
        });
        assert!(closer.is_ok());
    }
}
