//! Pinned read views and lazy scans.

use super::{Direction, EntryIter, KeyRange, KvStore, ReadView};
use crate::error::StorageResult;
use std::collections::VecDeque;
use std::ops::Bound;

/// Registration of one reader at a committed sequence.
///
/// Versions visible at the pinned sequence are kept until every pin on it is
/// dropped.
pub(crate) struct SnapshotPin<'a> {
    store: &'a KvStore,
    seq: u64,
}

impl<'a> SnapshotPin<'a> {
    pub(crate) fn new(store: &'a KvStore, seq: u64) -> Self {
        Self { store, seq }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn store(&self) -> &'a KvStore {
        self.store
    }
}

impl Clone for SnapshotPin<'_> {
    fn clone(&self) -> Self {
        self.store.repin(self.seq);
        Self {
            store: self.store,
            seq: self.seq,
        }
    }
}

impl Drop for SnapshotPin<'_> {
    fn drop(&mut self) {
        self.store.unpin(self.seq);
    }
}

/// A consistent read-only view of the store as of one commit.
pub struct Snapshot<'a> {
    pin: SnapshotPin<'a>,
}

impl<'a> Snapshot<'a> {
    pub(crate) fn new(pin: SnapshotPin<'a>) -> Self {
        Self { pin }
    }

    /// Returns the commit sequence this snapshot observes.
    #[must_use]
    pub fn sequence(&self) -> crate::SequenceNumber {
        crate::SequenceNumber::new(self.pin.seq())
    }

    /// Scans the snapshot. The returned iterator keeps its own pin.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Closed`] after shutdown.
    pub fn scan_iter(
        &self,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> StorageResult<ScanIter<'a>> {
        self.pin.store().check_open()?;
        Ok(ScanIter::new(self.pin.clone(), range, direction, limit))
    }
}

impl ReadView for Snapshot<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let store = self.pin.store();
        store.check_open()?;
        Ok(store.read_at(key, self.pin.seq()))
    }

    fn scan(
        &self,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> StorageResult<EntryIter<'_>> {
        Ok(Box::new(self.scan_iter(range, direction, limit)?))
    }
}

/// Lazy scan over a pinned sequence.
///
/// Entries are fetched in chunks, each under a short read lock, so a long
/// scan never blocks writers. Every chunk reads at the same pinned sequence.
pub struct ScanIter<'a> {
    pin: SnapshotPin<'a>,
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    direction: Direction,
    remaining: Option<usize>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl<'a> ScanIter<'a> {
    pub(crate) fn new(
        pin: SnapshotPin<'a>,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Self {
        Self {
            pin,
            lower: range.lower,
            upper: range.upper,
            direction,
            remaining: limit,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) -> StorageResult<()> {
        let store = self.pin.store();
        store.check_open()?;

        let want = match self.remaining {
            Some(left) => left.min(store.scan_chunk_size()),
            None => store.scan_chunk_size(),
        };
        let range = KeyRange::new(self.lower.clone(), self.upper.clone());
        let (lower, upper) = range.as_refs();
        let chunk = store.read_chunk(lower, upper, self.pin.seq(), self.direction.is_reverse(), want);

        if chunk.len() < want {
            self.exhausted = true;
        }
        if let Some((last, _)) = chunk.last() {
            // Resume strictly past the last key handed out.
            if self.direction.is_reverse() {
                self.upper = Bound::Excluded(last.clone());
            } else {
                self.lower = Bound::Excluded(last.clone());
            }
        }
        self.buffer.extend(chunk);
        Ok(())
    }
}

impl Iterator for ScanIter<'_> {
    type Item = StorageResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.refill() {
                self.exhausted = true;
                self.remaining = Some(0);
                return Some(Err(e));
            }
        }

        let entry = self.buffer.pop_front()?;
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some(Ok(entry))
    }
}

impl std::fmt::Debug for ScanIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanIter")
            .field("seq", &self.pin.seq())
            .field("direction", &self.direction)
            .field("remaining", &self.remaining)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("seq", &self.pin.seq())
            .finish()
    }
}
