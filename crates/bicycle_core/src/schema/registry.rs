//! Registered models.

use super::model::{Model, ModelDef};
use crate::error::{CoreResult, SchemaError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Entry {
    model: Arc<Model>,
    /// Loaded from the persisted catalog rather than registered by this
    /// process.
    from_catalog: bool,
}

/// What registering a definition would do.
#[derive(Debug)]
pub(crate) enum Registration {
    /// The same definition is already registered.
    Existing(Arc<Model>),
    /// The name is free.
    New,
    /// A persisted definition with another layout may be replaced if the
    /// model holds no records.
    ReplaceCatalog(Arc<Model>),
    /// Registered in this process with another layout.
    Conflicting(Arc<Model>),
}

/// Name to model map shared by every engine operation.
///
/// Handles are `Arc`s, so a caller holding one keeps a consistent layout
/// even if the entry is replaced later.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry from persisted definitions.
    pub(crate) fn seed(&self, defs: Vec<ModelDef>) -> CoreResult<()> {
        let mut entries = self.entries.write();
        for def in defs {
            let model = Arc::new(Model::compile(def)?);
            entries.insert(
                model.name().to_owned(),
                Entry {
                    model,
                    from_catalog: true,
                },
            );
        }
        Ok(())
    }

    /// Returns the model registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModel`].
    pub fn resolve(&self, name: &str) -> CoreResult<Arc<Model>> {
        self.get(name)
            .ok_or_else(|| SchemaError::unknown_model(name).into())
    }

    /// Returns the model registered as `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.entries.read().get(name).map(|e| Arc::clone(&e.model))
    }

    /// All models, sorted by name.
    #[must_use]
    pub fn models(&self) -> Vec<Arc<Model>> {
        let mut models: Vec<_> = self
            .entries
            .read()
            .values()
            .map(|e| Arc::clone(&e.model))
            .collect();
        models.sort_by(|a, b| a.name().cmp(b.name()));
        models
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn classify(&self, def: &ModelDef) -> Registration {
        match self.entries.read().get(&def.name) {
            None => Registration::New,
            Some(entry) if entry.model.def() == def => {
                Registration::Existing(Arc::clone(&entry.model))
            }
            Some(entry) if entry.from_catalog => {
                Registration::ReplaceCatalog(Arc::clone(&entry.model))
            }
            Some(entry) => Registration::Conflicting(Arc::clone(&entry.model)),
        }
    }

    pub(crate) fn install(&self, model: Arc<Model>) {
        self.entries.write().insert(
            model.name().to_owned(),
            Entry {
                model,
                from_catalog: false,
            },
        );
    }
}
