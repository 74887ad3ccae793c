//! Engine facade and recovery.

use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{CoreResult, SchemaError};
use crate::index::{verify_model, VerifyReport};
use crate::keys;
use crate::mutation::MutationCoordinator;
use crate::query::{self, IndexQuery};
use crate::schema::{Model, ModelDef, Registration, SchemaRegistry};
use crate::Durability;
use bicycle_codec::{from_cbor, to_cbor, Record};
use bicycle_storage::{
    Direction, FileBackend, KeyRange, KvStore, ReadView, StorageBackend, StoreOptions,
};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The main engine handle.
///
/// `Engine` owns the store, the schema registry, and, for on-disk engines,
/// the locked data directory. It is `Send + Sync`; share it across threads
/// behind an `Arc` or by reference.
///
/// ```rust
/// use bicycle_core::{Engine, FieldType, IndexDef, IndexQuery, ModelDef, Record};
///
/// let engine = Engine::open_in_memory().unwrap();
/// engine
///     .register(
///         ModelDef::new("Example")
///             .field("id", FieldType::Integer)
///             .field("email", FieldType::Text)
///             .primary_key(["id"])
///             .index(IndexDef::new("by_email", ["email"]).unique()),
///     )
///     .unwrap();
///
/// engine
///     .put("Example", Record::new().with("id", 1).with("email", "a@x.com"))
///     .unwrap();
/// let found = engine
///     .get_by_index("Example", &IndexQuery::new().eq("email", "a@x.com"))
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct Engine {
    store: KvStore,
    registry: SchemaRegistry,
    config: Config,
    /// Held for the lock; dropped after the store.
    dir: Option<DataDir>,
}

/// Per-model counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    /// Model name.
    pub name: String,
    /// Live records.
    pub records: usize,
    /// Declared secondary indexes.
    pub indexes: usize,
}

/// Engine counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Models, sorted by name.
    pub models: Vec<ModelStats>,
    /// Live keys across records, index entries, and the catalog.
    pub live_keys: usize,
    /// Stored versions, tombstones included.
    pub versions: usize,
    /// Last committed sequence.
    pub committed_seq: u64,
    /// Pinned snapshots.
    pub active_snapshots: usize,
    /// Log size in bytes, `None` when volatile.
    pub log_bytes: Option<u64>,
    /// Configured durability.
    pub durability: Durability,
}

impl Engine {
    /// Opens or creates an engine in the directory `path`.
    ///
    /// # Errors
    ///
    /// Returns [`bicycle_storage::StorageError::Locked`] if another engine
    /// holds the directory, a corruption error if the log fails validation,
    /// or a schema error if the persisted catalog cannot be compiled.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DataDir::open(path, config.create_if_missing)?;
        let store = if config.durability.is_logged() {
            let backend = FileBackend::open(&dir.log_path())?;
            KvStore::open(Box::new(backend), store_options(&config))?
        } else {
            KvStore::volatile(store_options(&config))
        };
        tracing::info!(path = %path.display(), durability = ?config.durability, "opening engine");
        Self::assemble(store, config, Some(dir))
    }

    /// Opens a volatile engine with no log.
    ///
    /// # Errors
    ///
    /// Infallible in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        let config = Config::new().durability(Durability::Volatile);
        let store = KvStore::volatile(store_options(&config));
        Self::assemble(store, config, None)
    }

    /// Opens an engine logged to `backend`, replaying what it holds.
    ///
    /// The backend always carries a log; `config.durability` only decides
    /// whether commits fsync.
    ///
    /// # Errors
    ///
    /// Returns a corruption or I/O error from recovery, or a schema error if
    /// the persisted catalog cannot be compiled.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let store = KvStore::open(backend, store_options(&config))?;
        Self::assemble(store, config, None)
    }

    fn assemble(store: KvStore, config: Config, dir: Option<DataDir>) -> CoreResult<Self> {
        let mut defs = Vec::new();
        {
            let snapshot = store.snapshot()?;
            for entry in snapshot.scan(keys::catalog_range(), Direction::Forward, None)? {
                let (_, value) = entry?;
                defs.push(from_cbor::<ModelDef>(&value)?);
            }
        }
        let registry = SchemaRegistry::new();
        registry.seed(defs)?;
        tracing::info!(
            models = registry.len(),
            committed_seq = store.committed_seq().as_u64(),
            "engine ready"
        );

        Ok(Self {
            store,
            registry,
            config,
            dir,
        })
    }

    /// Registers a model and returns its handle.
    ///
    /// Registering an identical definition again returns the existing
    /// handle. A definition that differs from a persisted one replaces it
    /// while the model holds no records.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::InvalidDefinition`] if `def` is malformed
    /// - [`SchemaError::Immutable`] if the layout differs and records exist
    /// - [`SchemaError::Conflict`] if this engine already registered the
    ///   name with another layout
    pub fn register(&self, def: ModelDef) -> CoreResult<Arc<Model>> {
        let compiled = Model::compile(def)?;
        if let Registration::Existing(model) = self.registry.classify(compiled.def()) {
            return Ok(model);
        }

        // The writer lock orders registration against puts.
        let mut txn = self.store.begin_write()?;
        let name = compiled.name().to_owned();
        match self.registry.classify(compiled.def()) {
            Registration::Existing(model) => return Ok(model),
            Registration::New => {}
            Registration::ReplaceCatalog(existing) => {
                if has_records(&txn, &existing)? {
                    return Err(SchemaError::Immutable { model: name }.into());
                }
                tracing::info!(model = %name, "replacing persisted model layout");
            }
            Registration::Conflicting(existing) => {
                if has_records(&txn, &existing)? {
                    return Err(SchemaError::Immutable { model: name }.into());
                }
                return Err(SchemaError::Conflict { model: name }.into());
            }
        }

        txn.put(keys::catalog_key(&name)?, to_cbor(compiled.def())?);
        let model = Arc::new(compiled);
        // Installed before the writer lock drops, so the next writer resolves
        // the new layout.
        txn.commit_with(|_| self.registry.install(Arc::clone(&model)))?;
        tracing::info!(model = %name, indexes = model.indexes().len(), "model registered");
        Ok(model)
    }

    /// Returns the handle of a registered model.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModel`].
    pub fn model(&self, name: &str) -> CoreResult<Arc<Model>> {
        self.registry.resolve(name)
    }

    /// All registered models, sorted by name.
    #[must_use]
    pub fn models(&self) -> Vec<Arc<Model>> {
        self.registry.models()
    }

    /// Returns the records matching `query`, in index order.
    ///
    /// The query reads one snapshot, so a batch committing concurrently is
    /// seen completely or not at all.
    ///
    /// # Errors
    ///
    /// Returns a schema, query, or codec error for bad input, or a storage
    /// error.
    pub fn get_by_index(&self, model: &str, query: &IndexQuery) -> CoreResult<Vec<Record>> {
        let model = self.registry.resolve(model)?;
        let snapshot = self.store.snapshot()?;
        let found = query::resolve(&snapshot, &model, query)?;
        Ok(found.into_iter().map(|m| m.record).collect())
    }

    /// Deletes the records matching `query` atomically and returns how many
    /// were deleted. Limit and offset select which matches are deleted.
    ///
    /// # Errors
    ///
    /// As [`Engine::get_by_index`]; nothing is deleted on error.
    pub fn delete_by_index(&self, model: &str, query: &IndexQuery) -> CoreResult<usize> {
        MutationCoordinator::new(&self.store, &self.registry).delete(model, query)
    }

    /// Inserts or fully replaces one record.
    ///
    /// # Errors
    ///
    /// Returns a codec error for invalid records,
    /// [`crate::ConflictError::UniqueViolation`] on a unique index clash, or
    /// a storage error. Nothing is written on error.
    pub fn put(&self, model: &str, record: Record) -> CoreResult<()> {
        MutationCoordinator::new(&self.store, &self.registry).put(model, vec![record])?;
        Ok(())
    }

    /// Inserts or replaces every record atomically: all become visible
    /// together, or none do.
    ///
    /// Records are applied in order, so a later record with the same
    /// primary key replaces an earlier one, and uniqueness is checked
    /// against the records before it in the batch.
    ///
    /// # Errors
    ///
    /// As [`Engine::put`]; one failing record fails the whole batch.
    pub fn batch_put(&self, model: &str, records: Vec<Record>) -> CoreResult<()> {
        MutationCoordinator::new(&self.store, &self.registry).put(model, records)?;
        Ok(())
    }

    /// Number of live records of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModel`] or a storage error.
    pub fn count(&self, model: &str) -> CoreResult<usize> {
        let model = self.registry.resolve(model)?;
        let snapshot = self.store.snapshot()?;
        count_records(&snapshot, &model)
    }

    /// Compacts the log to the live data and returns its new size.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the previous log stays valid.
    pub fn checkpoint(&self) -> CoreResult<u64> {
        Ok(self.store.checkpoint()?)
    }

    /// Shuts the engine down. Every later operation fails with
    /// [`bicycle_storage::StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final log sync fails.
    pub fn close(&self) -> CoreResult<()> {
        Ok(self.store.close()?)
    }

    /// Returns true after [`Engine::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    /// Returns current counters.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn stats(&self) -> CoreResult<EngineStats> {
        let snapshot = self.store.snapshot()?;
        let models = self
            .registry
            .models()
            .iter()
            .map(|model| {
                Ok(ModelStats {
                    name: model.name().to_owned(),
                    records: count_records(&snapshot, model)?,
                    indexes: model.indexes().len(),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        drop(snapshot);

        let store = self.store.stats()?;
        Ok(EngineStats {
            models,
            live_keys: store.live_keys,
            versions: store.versions,
            committed_seq: store.committed_seq.as_u64(),
            active_snapshots: store.active_snapshots,
            log_bytes: store.log_bytes,
            durability: self.config.durability,
        })
    }

    /// Checks every index against the records it derives from.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error if data cannot be read.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        let snapshot = self.store.snapshot()?;
        let models = self
            .registry
            .models()
            .iter()
            .map(|model| verify_model(&snapshot, model))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(VerifyReport { models })
    }

    /// The configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The data directory, `None` for in-memory and custom-backend engines.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DataDir::path)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path())
            .field("models", &self.registry.len())
            .field("committed_seq", &self.store.committed_seq())
            .field("closed", &self.store.is_closed())
            .finish_non_exhaustive()
    }
}

fn store_options(config: &Config) -> StoreOptions {
    StoreOptions::default()
        .sync_on_commit(config.durability.syncs_on_commit())
        .scan_chunk(config.scan_chunk)
}

fn model_range(model: &Model) -> KeyRange {
    KeyRange::prefix(model.primary_key().prefix())
}

fn has_records(view: &dyn ReadView, model: &Model) -> CoreResult<bool> {
    let mut entries = view.scan(model_range(model), Direction::Forward, Some(1))?;
    Ok(entries.next().transpose()?.is_some())
}

fn count_records(view: &dyn ReadView, model: &Model) -> CoreResult<usize> {
    let mut count = 0;
    for entry in view.scan(model_range(model), Direction::Forward, None)? {
        entry?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, QueryError};
    use crate::schema::{FieldType, IndexDef};
    use bicycle_codec::{CodecError, Value};
    use bicycle_storage::{InMemoryBackend, StorageError};
    use tempfile::tempdir;

    fn example() -> ModelDef {
        ModelDef::new("Example")
            .field("id", FieldType::Integer)
            .field("email", FieldType::Text)
            .primary_key(["id"])
            .index(IndexDef::new("by_email", ["email"]).unique())
    }

    fn row(id: i64, email: &str) -> Record {
        Record::new().with("id", id).with("email", email)
    }

    #[test]
    fn example_scenario() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();

        engine.put("Example", row(1, "a@x.com")).unwrap();
        let err = engine.put("Example", row(2, "a@x.com")).unwrap_err();
        assert!(err.is_unique_violation());

        let by_id = IndexQuery::new().eq("id", 1);
        assert_eq!(
            engine.get_by_index("Example", &by_id).unwrap(),
            vec![row(1, "a@x.com")]
        );
        assert!(engine
            .get_by_index("Example", &IndexQuery::new().eq("id", 2))
            .unwrap()
            .is_empty());

        let deleted = engine
            .delete_by_index("Example", &IndexQuery::new().eq("email", "a@x.com"))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(engine.get_by_index("Example", &by_id).unwrap().is_empty());
        assert!(engine.verify().unwrap().is_consistent());
    }

    #[test]
    fn replacing_put_moves_index_entries() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();
        engine.put("Example", row(1, "old@x.com")).unwrap();
        engine.put("Example", row(1, "new@x.com")).unwrap();

        let old = IndexQuery::new().eq("email", "old@x.com");
        assert!(engine.get_by_index("Example", &old).unwrap().is_empty());
        // The freed key can be taken by another record.
        engine.put("Example", row(2, "old@x.com")).unwrap();
        assert_eq!(engine.count("Example").unwrap(), 2);
        assert!(engine.verify().unwrap().is_consistent());
    }

    #[test]
    fn registration_is_idempotent() {
        let engine = Engine::open_in_memory().unwrap();
        let first = engine.register(example()).unwrap();
        let second = engine.register(example()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.models().len(), 1);
    }

    #[test]
    fn differing_layout_is_rejected() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();

        let changed = example().optional_field("name", FieldType::Text);
        let err = engine.register(changed.clone()).unwrap_err();
        assert!(matches!(err, CoreError::Schema(SchemaError::Conflict { .. })));

        engine.put("Example", row(1, "a@x.com")).unwrap();
        let err = engine.register(changed).unwrap_err();
        assert!(matches!(err, CoreError::Schema(SchemaError::Immutable { .. })));
    }

    #[test]
    fn invalid_input_fails_before_storage() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();
        let before = engine.stats().unwrap().committed_seq;

        let err = engine
            .put("Example", Record::new().with("email", "a@x.com"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Codec(CodecError::MissingPrimaryKey { .. })));

        let err = engine.put("Nope", row(1, "a")).unwrap_err();
        assert!(matches!(err, CoreError::Schema(SchemaError::UnknownModel { .. })));

        let err = engine
            .get_by_index("Example", &IndexQuery::new().eq("email", Value::Integer(3)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Codec(CodecError::TypeMismatch { .. })));

        let err = engine
            .delete_by_index("Example", &IndexQuery::new().eq("ghost", 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::Query(QueryError::UnknownField { .. })));

        assert_eq!(engine.stats().unwrap().committed_seq, before);
    }

    #[test]
    fn batch_conflict_writes_nothing() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();
        engine.put("Example", row(100, "taken@x.com")).unwrap();

        let batch = vec![
            row(1, "one@x.com"),
            row(2, "taken@x.com"),
            row(3, "three@x.com"),
        ];
        assert!(engine.batch_put("Example", batch).unwrap_err().is_unique_violation());
        assert_eq!(engine.count("Example").unwrap(), 1);

        let inner = vec![row(4, "dup@x.com"), row(5, "dup@x.com")];
        assert!(engine.batch_put("Example", inner).unwrap_err().is_unique_violation());
        assert_eq!(engine.count("Example").unwrap(), 1);
    }

    #[test]
    fn catalog_and_data_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(dir.path(), Config::default()).unwrap();
            engine.register(example()).unwrap();
            engine
                .batch_put("Example", vec![row(1, "a@x.com"), row(2, "b@x.com")])
                .unwrap();
            engine.close().unwrap();
        }

        let engine = Engine::open(dir.path(), Config::default()).unwrap();
        let model = engine.model("Example").unwrap();
        assert_eq!(model.def(), &example());
        assert_eq!(engine.count("Example").unwrap(), 2);

        // Re-registering the persisted layout is a no-op.
        let again = engine.register(example()).unwrap();
        assert!(Arc::ptr_eq(&model, &again));

        // A new layout cannot replace a model with records.
        let err = engine
            .register(example().optional_field("age", FieldType::Integer))
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema(SchemaError::Immutable { .. })));
    }

    #[test]
    fn empty_persisted_model_can_be_replaced() {
        let medium = InMemoryBackend::new();
        {
            let engine = Engine::open_with_backend(Box::new(medium.clone()), Config::default()).unwrap();
            engine.register(example()).unwrap();
        }
        let engine = Engine::open_with_backend(Box::new(medium.clone()), Config::default()).unwrap();
        let wider = example().optional_field("age", FieldType::Integer);
        let model = engine.register(wider.clone()).unwrap();
        assert_eq!(model.def(), &wider);
        drop(engine);

        let engine = Engine::open_with_backend(Box::new(medium), Config::default()).unwrap();
        assert_eq!(engine.model("Example").unwrap().def(), &wider);
    }

    #[test]
    fn replacing_a_layout_races_cleanly_with_puts() {
        let wider = example()
            .optional_field("age", FieldType::Integer)
            .index(IndexDef::new("by_age", ["age"]));

        for _ in 0..20 {
            let medium = InMemoryBackend::new();
            {
                let engine = Engine::open_with_backend(Box::new(medium.clone()), Config::default()).unwrap();
                engine.register(example()).unwrap();
            }
            let engine = Engine::open_with_backend(Box::new(medium), Config::default()).unwrap();

            let registered = std::thread::scope(|s| {
                let writer = s.spawn(|| {
                    for id in 0..20 {
                        engine.put("Example", row(id, &format!("{id}@x.com"))).unwrap();
                    }
                });
                let registered = engine.register(wider.clone());
                writer.join().unwrap();
                registered
            });

            match registered {
                Ok(model) => assert_eq!(model.def(), &wider),
                Err(err) => {
                    assert!(matches!(err, CoreError::Schema(SchemaError::Immutable { .. })));
                    assert_eq!(engine.model("Example").unwrap().def(), &example());
                }
            }
            assert_eq!(engine.count("Example").unwrap(), 20);
            assert!(engine.verify().unwrap().is_consistent());
        }
    }

    #[test]
    fn concurrent_registrations_agree_on_one_layout() {
        let wider = example().optional_field("age", FieldType::Integer);
        for _ in 0..20 {
            let engine = Engine::open_in_memory().unwrap();
            let (a, b) = std::thread::scope(|s| {
                let a = s.spawn(|| engine.register(example()));
                let b = s.spawn(|| engine.register(wider.clone()));
                (a.join().unwrap(), b.join().unwrap())
            });

            let winner = match (a, b) {
                (Ok(model), Err(err)) | (Err(err), Ok(model)) => {
                    assert!(matches!(err, CoreError::Schema(SchemaError::Conflict { .. })));
                    model
                }
                (a, b) => panic!("expected exactly one registration, got {a:?} and {b:?}"),
            };
            assert!(Arc::ptr_eq(&winner, &engine.model("Example").unwrap()));
        }
    }

    #[test]
    fn second_engine_on_directory_is_locked() {
        let dir = tempdir().unwrap();
        let _engine = Engine::open(dir.path(), Config::default()).unwrap();
        let err = Engine::open(dir.path(), Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::Storage(StorageError::Locked)));
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());

        let errors = [
            engine.put("Example", row(1, "a")).unwrap_err(),
            engine.get_by_index("Example", &IndexQuery::new()).unwrap_err(),
            engine.delete_by_index("Example", &IndexQuery::new()).unwrap_err(),
            engine.batch_put("Example", vec![row(2, "b")]).unwrap_err(),
        ];
        for err in errors {
            assert!(err.is_closed(), "{err}");
        }
    }

    #[test]
    fn stats_count_models() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register(example()).unwrap();
        engine.put("Example", row(1, "a@x.com")).unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(
            stats.models,
            vec![ModelStats {
                name: "Example".into(),
                records: 1,
                indexes: 1
            }]
        );
        // catalog entry + record + index entry
        assert_eq!(stats.live_keys, 3);
        assert_eq!(stats.log_bytes, None);
        assert_eq!(stats.durability, Durability::Volatile);
    }

    #[test]
    fn checkpoint_keeps_data() {
        let medium = InMemoryBackend::new();
        {
            let engine = Engine::open_with_backend(Box::new(medium.clone()), Config::default()).unwrap();
            engine.register(example()).unwrap();
            for id in 0..10 {
                engine.put("Example", row(id, &format!("{id}@x.com"))).unwrap();
            }
            engine
                .delete_by_index("Example", &IndexQuery::new().lt("id", 5))
                .unwrap();
            let before = engine.stats().unwrap().log_bytes.unwrap();
            let after = engine.checkpoint().unwrap();
            assert!(after < before);
        }
        let engine = Engine::open_with_backend(Box::new(medium), Config::default()).unwrap();
        assert_eq!(engine.count("Example").unwrap(), 5);
        assert!(engine.verify().unwrap().is_consistent());
    }
}
