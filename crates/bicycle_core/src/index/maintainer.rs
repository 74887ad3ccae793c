//! Derives index mutations from record changes.

use crate::error::{ConflictError, CoreResult};
use crate::schema::Model;
use bicycle_codec::Record;
use bicycle_storage::{Direction, KeyRange, ReadView, WriteTransaction};

/// One change to an index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMutation {
    /// Add an entry pointing at a primary-key tuple.
    Insert {
        /// Entry key.
        key: Vec<u8>,
        /// Primary-key tuple.
        value: Vec<u8>,
    },
    /// Drop an entry.
    Remove {
        /// Entry key.
        key: Vec<u8>,
    },
}

impl IndexMutation {
    /// Entry key touched by this mutation.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Insert { key, .. } | Self::Remove { key } => key,
        }
    }

    pub(crate) fn stage(self, txn: &mut WriteTransaction<'_>) {
        match self {
            Self::Insert { key, value } => txn.put(key, value),
            Self::Remove { key } => txn.delete(key),
        }
    }
}

/// Computes index deltas and enforces uniqueness for one model.
#[derive(Debug, Clone, Copy)]
pub struct IndexMaintainer<'m> {
    model: &'m Model,
}

impl<'m> IndexMaintainer<'m> {
    /// Creates a maintainer for `model`.
    #[must_use]
    pub fn new(model: &'m Model) -> Self {
        Self { model }
    }

    /// Mutations that move every secondary index from `old` to `new`.
    /// Both records share the primary-key tuple `pk`. Indexes whose key is
    /// unchanged produce nothing.
    ///
    /// # Errors
    ///
    /// Returns a codec error if an indexed value cannot be encoded.
    pub fn on_put(
        &self,
        old: Option<&Record>,
        new: &Record,
        pk: &[u8],
    ) -> CoreResult<Vec<IndexMutation>> {
        let mut mutations = Vec::new();
        for index in self.model.indexes() {
            let new_key = index.entry_key(new, pk)?;
            if let Some(old) = old {
                let old_key = index.entry_key(old, pk)?;
                if old_key == new_key {
                    continue;
                }
                mutations.push(IndexMutation::Remove { key: old_key });
            }
            mutations.push(IndexMutation::Insert {
                key: new_key,
                value: pk.to_vec(),
            });
        }
        Ok(mutations)
    }

    /// Mutations that drop every secondary entry of `old`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if an indexed value cannot be encoded.
    pub fn on_delete(&self, old: &Record, pk: &[u8]) -> CoreResult<Vec<IndexMutation>> {
        self.model
            .indexes()
            .iter()
            .map(|index| {
                Ok(IndexMutation::Remove {
                    key: index.entry_key(old, pk)?,
                })
            })
            .collect()
    }

    /// Fails if a unique index already maps `new`'s key to a record other
    /// than `pk`. Keys with a null component never conflict.
    ///
    /// `view` must be the write transaction that will commit `new`, with
    /// every write of the batch already staged, so the check sees the state
    /// that would be published and shares its linearization point.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::UniqueViolation`], or the storage error that
    /// stopped the lookup.
    pub fn check_unique(&self, view: &dyn ReadView, new: &Record, pk: &[u8]) -> CoreResult<()> {
        for index in self.model.indexes().iter().filter(|i| i.is_unique()) {
            if index.has_null(new) {
                continue;
            }
            let mut prefix = index.prefix().to_vec();
            prefix.extend_from_slice(&index.tuple(new)?);

            for entry in view.scan(KeyRange::prefix(&prefix), Direction::Forward, Some(2))? {
                let (_, owner) = entry?;
                if owner != pk {
                    return Err(ConflictError::UniqueViolation {
                        model: self.model.name().to_owned(),
                        index: index.name().to_owned(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Every secondary entry key `record` should have.
    ///
    /// # Errors
    ///
    /// Returns a codec error if an indexed value cannot be encoded.
    pub fn expected_keys(&self, record: &Record, pk: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        self.model
            .indexes()
            .iter()
            .map(|index| Ok(index.entry_key(record, pk)?))
            .collect()
    }
}
