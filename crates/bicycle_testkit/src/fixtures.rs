//! Engine fixtures and seeded scenarios.

use bicycle_core::{Config, Engine, FieldType, IndexDef, ModelDef, Record};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the example model.
pub const EXAMPLE: &str = "Example";

/// `Example { id: integer, email: text }`, primary key `id`, unique
/// index `by_email`.
pub fn example_model() -> ModelDef {
    ModelDef::new(EXAMPLE)
        .field("id", FieldType::Integer)
        .field("email", FieldType::Text)
        .primary_key(["id"])
        .index(IndexDef::new("by_email", ["email"]).unique())
}

/// An `Example` record.
pub fn example_record(id: i64, email: &str) -> Record {
    Record::new().with("id", id).with("email", email)
}

/// A test engine with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    /// Kept alive so the directory outlives the engine.
    temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Creates an in-memory engine.
    pub fn memory() -> Self {
        Self {
            engine: Engine::open_in_memory().expect("failed to open in-memory engine"),
            temp_dir: None,
        }
    }

    /// Creates an engine in a fresh temporary directory with the default
    /// (synced) durability.
    pub fn file() -> Self {
        Self::file_with(Config::new())
    }

    /// Creates an engine in a fresh temporary directory.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let engine = Engine::open(&temp_dir.path().join("data"), config)
            .expect("failed to open file engine");
        Self {
            engine,
            temp_dir: Some(temp_dir),
        }
    }

    /// Registers the example model.
    #[must_use]
    pub fn with_example(self) -> Self {
        self.engine
            .register(example_model())
            .expect("failed to register example model");
        self
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("data"))
    }

    /// Drops the engine and opens a new one on the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory engines, which have nothing to reopen.
    #[must_use]
    pub fn reopen(self) -> Self {
        let config = self.engine.config().clone();
        let path = self.path().expect("only file engines can be reopened");
        let temp_dir = self.temp_dir;
        drop(self.engine);
        let engine = Engine::open(&path, config).expect("failed to reopen engine");
        Self { engine, temp_dir }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs `f` with an in-memory engine that has the example model.
pub fn with_example_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let test = TestEngine::memory().with_example();
    f(&test.engine)
}

/// Runs `f` with a file engine and its data directory.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine, &Path) -> R,
{
    let test = TestEngine::file();
    let path = test.path().expect("file engine should have a path");
    f(&test.engine, &path)
}

/// Seeded scenarios.
pub mod scenarios {
    use super::*;

    /// An in-memory engine with `count` example records, ids `0..count`
    /// and emails `user{id}@x.com`.
    pub fn populated_example(count: usize) -> TestEngine {
        let test = TestEngine::memory().with_example();
        let records = (0..count as i64)
            .map(|id| example_record(id, &format!("user{id}@x.com")))
            .collect();
        test.batch_put(EXAMPLE, records)
            .expect("failed to seed example records");
        test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bicycle_core::IndexQuery;

    #[test]
    fn memory_fixture_has_no_path() {
        let test = TestEngine::memory();
        assert!(test.path().is_none());
        assert!(test.models().is_empty());
    }

    #[test]
    fn file_fixture_survives_reopen() {
        let test = TestEngine::file().with_example();
        test.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();
        let test = test.reopen();
        assert_eq!(test.count(EXAMPLE).unwrap(), 1);
    }

    #[test]
    fn populated_scenario() {
        let test = scenarios::populated_example(10);
        let found = test
            .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", "user3@x.com"))
            .unwrap();
        assert_eq!(found, vec![example_record(3, "user3@x.com")]);
    }
}
