//! Sequences record writes into single write transactions.
//!
//! Every call moves through `validating -> resolving-deltas -> committing`
//! and ends `committed` or `aborted`. Nothing is visible to readers before
//! the commit; an error in any phase drops the transaction, which discards
//! its staged writes and releases the writer lock.

use crate::error::CoreResult;
use crate::index::IndexMaintainer;
use crate::query::{self, IndexQuery};
use crate::schema::{Model, SchemaRegistry};
use bicycle_codec::Record;
use bicycle_storage::{KvStore, ReadView, WriteTransaction};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validating,
    ResolvingDeltas,
    Committing,
    Committed,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validating => "validating",
            Self::ResolvingDeltas => "resolving-deltas",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        })
    }
}

/// Tracks and logs the phase of one call.
struct Progress<'a> {
    op: &'static str,
    model: &'a str,
    phase: Phase,
}

impl<'a> Progress<'a> {
    fn start(op: &'static str, model: &'a str) -> Self {
        let progress = Self {
            op,
            model,
            phase: Phase::Validating,
        };
        progress.log();
        progress
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.log();
    }

    fn log(&self) {
        tracing::debug!(op = self.op, model = self.model, phase = %self.phase, "mutation");
    }

    /// Records the outcome of the call and passes it through.
    fn finish<T>(mut self, result: CoreResult<T>) -> CoreResult<T> {
        match &result {
            Ok(_) => self.enter(Phase::Committed),
            Err(e) => {
                let failed_in = self.phase;
                self.phase = Phase::Aborted;
                tracing::debug!(
                    op = self.op,
                    model = self.model,
                    phase = %self.phase,
                    failed_in = %failed_in,
                    error = %e,
                    "mutation"
                );
            }
        }
        result
    }
}

/// A validated record ready to be written.
struct Prepared {
    pk: Vec<u8>,
    record: Record,
    payload: Vec<u8>,
}

/// Drives puts and deletes for one engine.
pub(crate) struct MutationCoordinator<'e> {
    store: &'e KvStore,
    registry: &'e SchemaRegistry,
}

impl<'e> MutationCoordinator<'e> {
    pub(crate) fn new(store: &'e KvStore, registry: &'e SchemaRegistry) -> Self {
        Self { store, registry }
    }

    /// Writes `records` as one atomic batch. Returns the number written.
    pub(crate) fn put(&self, model: &str, records: Vec<Record>) -> CoreResult<usize> {
        let mut progress = Progress::start("put", model);
        let result = self.put_inner(model, records, &mut progress);
        progress.finish(result)
    }

    /// Deletes every record matching `query` as one atomic batch. Returns
    /// the number deleted.
    pub(crate) fn delete(&self, model: &str, query: &IndexQuery) -> CoreResult<usize> {
        let mut progress = Progress::start("delete", model);
        let result = self.delete_inner(model, query, &mut progress);
        progress.finish(result)
    }

    fn put_inner(
        &self,
        name: &str,
        records: Vec<Record>,
        progress: &mut Progress<'_>,
    ) -> CoreResult<usize> {
        let model = self.registry.resolve(name)?;
        let mut prepared = prepare(&model, records)?;

        let mut txn = self.store.begin_write()?;
        // A re-registration may have swapped the layout while we waited.
        let current = self.registry.resolve(name)?;
        let model = if Arc::ptr_eq(&model, &current) {
            model
        } else {
            prepared = prepare(&current, prepared.into_iter().map(|p| p.record).collect())?;
            current
        };

        progress.enter(Phase::ResolvingDeltas);
        let maintainer = IndexMaintainer::new(&model);
        let count = prepared.len();
        // Last write per primary key.
        let mut written = BTreeMap::new();
        for Prepared {
            pk,
            record,
            payload,
        } in prepared
        {
            let key = model.record_key(&pk);
            let old = txn
                .get(&key)?
                .map(|bytes| model.decode_record(&bytes))
                .transpose()?;
            for mutation in maintainer.on_put(old.as_ref(), &record, &pk)? {
                mutation.stage(&mut txn);
            }
            txn.put(key, payload);
            written.insert(pk, record);
        }

        // Checked against the fully staged batch, so the order of records
        // inside a batch never changes the outcome.
        for (pk, record) in &written {
            maintainer.check_unique(&txn, record, pk)?;
        }

        progress.enter(Phase::Committing);
        commit(txn)?;
        Ok(count)
    }

    fn delete_inner(
        &self,
        name: &str,
        query: &IndexQuery,
        progress: &mut Progress<'_>,
    ) -> CoreResult<usize> {
        self.registry.resolve(name)?;

        let mut txn = self.store.begin_write()?;
        let model = self.registry.resolve(name)?;

        progress.enter(Phase::ResolvingDeltas);
        let targets = query::resolve(&txn, &model, query)?;
        let maintainer = IndexMaintainer::new(&model);
        for target in &targets {
            for mutation in maintainer.on_delete(&target.record, &target.pk)? {
                mutation.stage(&mut txn);
            }
            txn.delete(model.record_key(&target.pk));
        }

        progress.enter(Phase::Committing);
        commit(txn)?;
        Ok(targets.len())
    }
}

fn prepare(model: &Model, records: Vec<Record>) -> CoreResult<Vec<Prepared>> {
    records
        .into_iter()
        .map(|record| {
            let record = model.validate(record)?;
            Ok(Prepared {
                pk: model.pk_tuple(&record)?,
                payload: model.encode_record(&record)?,
                record,
            })
        })
        .collect()
}

fn commit(txn: WriteTransaction<'_>) -> CoreResult<()> {
    if txn.is_empty() {
        txn.abort();
        return Ok(());
    }
    txn.commit()?;
    Ok(())
}
