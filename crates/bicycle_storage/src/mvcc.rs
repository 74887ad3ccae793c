//! Multi-version key space.
//!
//! Each key maps to a chain of versions ordered by commit sequence. A reader
//! pinned at sequence `s` sees, for every key, the newest version with a
//! sequence `<= s`. A `None` version is a tombstone.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Returns true when no key can fall between `lower` and `upper`.
///
/// `BTreeMap::range` panics on such bounds, so callers check first.
pub(crate) fn range_is_empty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
            lo >= hi
        }
        _ => false,
    }
}

/// Versions of a single key, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionChain {
    versions: Vec<(u64, Option<Vec<u8>>)>,
}

impl VersionChain {
    /// Returns the value visible at `seq`.
    #[must_use]
    pub fn visible_at(&self, seq: u64) -> Option<&[u8]> {
        self.versions
            .iter()
            .rev()
            .find(|(version, _)| *version <= seq)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Returns the newest value, ignoring snapshots.
    #[must_use]
    pub fn latest(&self) -> Option<&[u8]> {
        self.versions.last().and_then(|(_, value)| value.as_deref())
    }

    fn push(&mut self, seq: u64, value: Option<Vec<u8>>) {
        match self.versions.last_mut() {
            Some(last) if last.0 == seq => last.1 = value,
            _ => self.versions.push((seq, value)),
        }
    }

    /// Drops versions no reader at or above `horizon` can see.
    ///
    /// Keeps every version newer than `horizon` plus the newest one at or
    /// below it. That one is dropped too when it is a tombstone.
    fn prune(&mut self, horizon: u64) {
        let visible = self.versions.iter().rposition(|(seq, _)| *seq <= horizon);
        if let Some(index) = visible {
            self.versions.drain(..index);
            if self.versions.first().is_some_and(|(_, value)| value.is_none()) {
                self.versions.remove(0);
            }
        }
    }

    /// Number of stored versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no versions remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Ordered map from key to version chain.
#[derive(Debug, Default)]
pub struct VersionedMap {
    entries: BTreeMap<Vec<u8>, VersionChain>,
    live: usize,
}

impl VersionedMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `key` visible at `seq`.
    #[must_use]
    pub fn get(&self, key: &[u8], seq: u64) -> Option<&[u8]> {
        self.entries.get(key).and_then(|chain| chain.visible_at(seq))
    }

    /// Records a new version of `key` at `seq`.
    pub fn apply(&mut self, key: Vec<u8>, seq: u64, value: Option<Vec<u8>>) {
        let chain = self.entries.entry(key).or_default();
        let was_live = chain.latest().is_some();
        let is_live = value.is_some();
        chain.push(seq, value);
        match (was_live, is_live) {
            (false, true) => self.live += 1,
            (true, false) => self.live -= 1,
            _ => {}
        }
    }

    /// Reads up to `limit` visible entries inside `(lower, upper)` at `seq`.
    ///
    /// Entries are returned in ascending key order, or descending when
    /// `reverse` is set. Keys whose visible version is a tombstone are
    /// skipped and do not count toward `limit`.
    #[must_use]
    pub fn range_chunk(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        seq: u64,
        reverse: bool,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        if range_is_empty(lower, upper) {
            return Vec::new();
        }

        let visible = |(key, chain): (&Vec<u8>, &VersionChain)| {
            chain
                .visible_at(seq)
                .map(|value| (key.clone(), value.to_vec()))
        };

        let range = self.entries.range::<[u8], _>((lower, upper));
        if reverse {
            range.rev().filter_map(visible).take(limit).collect()
        } else {
            range.filter_map(visible).take(limit).collect()
        }
    }

    /// Prunes the chains of `keys` against `horizon`.
    pub fn prune_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a [u8]>, horizon: u64) {
        for key in keys {
            if let Some(chain) = self.entries.get_mut(key) {
                chain.prune(horizon);
                if chain.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
    }

    /// Prunes every chain against `horizon`.
    pub fn prune_all(&mut self, horizon: u64) {
        self.entries.retain(|_, chain| {
            chain.prune(horizon);
            !chain.is_empty()
        });
    }

    /// Iterates over the newest live value of every key, in key order.
    pub fn latest_entries(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .filter_map(|(key, chain)| chain.latest().map(|value| (key.as_slice(), value)))
    }

    /// Number of keys whose newest version is live.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total number of stored versions, tombstones included.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.entries.values().map(VersionChain::len).sum()
    }
}
