//! Index consistency checks.

use super::maintainer::IndexMaintainer;
use crate::error::CoreResult;
use crate::schema::Model;
use bicycle_storage::{Direction, KeyRange, ReadView};
use serde::Serialize;
use std::collections::BTreeSet;

/// Consistency of one model's indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelReport {
    /// Model name.
    pub model: String,
    /// Live records.
    pub records: usize,
    /// Secondary index entries found.
    pub index_entries: usize,
    /// Entries with no matching record, or whose key no longer matches it.
    pub dangling: usize,
    /// Entries a record should have but doesn't.
    pub missing: usize,
}

impl ModelReport {
    /// Returns true if no entry is dangling or missing.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.dangling == 0 && self.missing == 0
    }
}

/// Result of [`crate::Engine::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// One report per model, sorted by name.
    pub models: Vec<ModelReport>,
}

impl VerifyReport {
    /// Returns true if every model is consistent.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.models.iter().all(ModelReport::is_consistent)
    }

    /// Total dangling entries.
    #[must_use]
    pub fn dangling(&self) -> usize {
        self.models.iter().map(|m| m.dangling).sum()
    }

    /// Total missing entries.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.models.iter().map(|m| m.missing).sum()
    }
}

/// Rebuilds the expected entry set of `model` from its records and
/// compares it with the stored entries.
pub(crate) fn verify_model(view: &dyn ReadView, model: &Model) -> CoreResult<ModelReport> {
    let maintainer = IndexMaintainer::new(model);
    let primary = model.primary_key();
    let mut report = ModelReport {
        model: model.name().to_owned(),
        ..ModelReport::default()
    };

    let mut expected = BTreeSet::new();
    let records = view.scan(KeyRange::prefix(primary.prefix()), Direction::Forward, None)?;
    for entry in records {
        let (key, value) = entry?;
        let record = model.decode_record(&value)?;
        let pk = &key[primary.prefix().len()..];
        expected.extend(maintainer.expected_keys(&record, pk)?);
        report.records += 1;
    }

    for index in model.indexes() {
        let entries = view.scan(KeyRange::prefix(index.prefix()), Direction::Forward, None)?;
        for entry in entries {
            let (key, pk) = entry?;
            report.index_entries += 1;
            if !key.ends_with(&pk) || !expected.remove(&key) {
                report.dangling += 1;
            }
        }
    }
    report.missing = expected.len();

    if !report.is_consistent() {
        tracing::warn!(
            model = model.name(),
            dangling = report.dangling,
            missing = report.missing,
            "index verification found inconsistencies"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, IndexDef, ModelDef};
    use bicycle_codec::Record;
    use bicycle_storage::KvStore;

    fn model() -> Model {
        Model::compile(
            ModelDef::new("Item")
                .field("id", FieldType::Integer)
                .field("tag", FieldType::Text)
                .primary_key(["id"])
                .index(IndexDef::new("by_tag", ["tag"])),
        )
        .unwrap()
    }

    fn put(store: &KvStore, model: &Model, id: i64, tag: &str, with_index: bool) -> Vec<u8> {
        let record = model
            .validate(Record::new().with("id", id).with("tag", tag))
            .unwrap();
        let pk = model.pk_tuple(&record).unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.put(model.record_key(&pk), model.encode_record(&record).unwrap());
        if with_index {
            for m in IndexMaintainer::new(model).on_put(None, &record, &pk).unwrap() {
                m.stage(&mut txn);
            }
        }
        txn.commit().unwrap();
        pk
    }

    #[test]
    fn consistent_store_reports_clean() {
        let model = model();
        let store = KvStore::in_memory();
        put(&store, &model, 1, "a", true);
        put(&store, &model, 2, "b", true);

        let report = verify_model(&store.snapshot().unwrap(), &model).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.index_entries, 2);
        assert!(report.is_consistent());
    }

    #[test]
    fn detects_missing_and_dangling() {
        let model = model();
        let store = KvStore::in_memory();
        put(&store, &model, 1, "a", false);
        let pk = put(&store, &model, 2, "b", true);

        // Drop record 2 but leave its entry behind.
        let mut txn = store.begin_write().unwrap();
        txn.delete(model.record_key(&pk));
        txn.commit().unwrap();

        let report = verify_model(&store.snapshot().unwrap(), &model).unwrap();
        assert_eq!(report.records, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.dangling, 1);

        let full = VerifyReport {
            models: vec![report],
        };
        assert!(!full.is_consistent());
        assert_eq!(full.dangling() + full.missing(), 2);
    }
}
